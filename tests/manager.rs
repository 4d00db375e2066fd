//! Config manager lifecycle: first run, cloud polling, rejected updates.

mod common;

use async_trait::async_trait;
use common::{start_failing_server, start_mock_server, MockResponse};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lantern_config::cloud::bootstrap::BootstrapRace;
use lantern_config::cloud::etag::EtagCache;
use lantern_config::cloud::fetch::{ConfigFetcher, FetchError};
use lantern_config::cloud::poll::CloudPoller;
use lantern_config::config::defaults::{DefaultSettings, DEFAULT_QOS, DEFAULT_WEIGHT};
use lantern_config::config::loader::{load_config, save_config};
use lantern_config::config::manager::{FirstRun, ManagerOptions};
use lantern_config::config::merge::merge;
use lantern_config::config::schema::{ChainedServerInfo, Role};
use lantern_config::net::dialer::{local_proxy_client, ProxyDialer};
use lantern_config::net::fronted::DirectFetcher;
use lantern_config::{ConfigError, ConfigManager, Shutdown};

const CLOUD_DOC: &str = r#"
trustedcas:
  - commonname: Test Root
    cert: "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n"
client:
  frontedservers:
    - host: b.fronted.test
      port: 443
    - host: a.fronted.test
      port: 443
proxiedsites:
  cloud: [b.com, a.com, a.com]
"#;

const UPDATE_DOC: &str = r#"
client:
  chainedservers:
    fallback-1:
      addr: 10.0.0.1:443
      authtoken: tok
"#;

fn options(dir: &tempfile::TempDir) -> ManagerOptions {
    let mut options = ManagerOptions::new(dir.path().join("lantern-9.9.9.yaml"));
    options.defaults = DefaultSettings {
        territory: Some("us".into()),
        ..Default::default()
    };
    options
}

fn poller(interval: Duration) -> CloudPoller {
    CloudPoller::with_interval(ConfigFetcher::new(EtagCache::new()), interval)
}

/// Direct path that sends every request to a local origin, keeping the path.
struct LocalOrigin(SocketAddr);

#[async_trait]
impl DirectFetcher for LocalOrigin {
    async fn response(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let path = url::Url::parse(url).unwrap().path().to_string();
        common::direct_client()
            .get(format!("http://{}{}", self.0, path))
            .send()
            .await
            .map_err(|e| FetchError::Fronted(e.to_string()))
    }
}

#[tokio::test]
async fn test_first_run_bootstraps_merges_and_defaults() {
    let (proxy, _) = start_mock_server(|_| MockResponse::config(CLOUD_DOC, "v1")).await;
    let (origin, _) = start_mock_server(|_| MockResponse::config(CLOUD_DOC, "v1")).await;

    let dir = tempfile::tempdir().unwrap();
    let mut options = options(&dir);
    options.bootstrap_timeout = Some(Duration::from_secs(10));
    options.defaults.statshub_addr = "stats.test".into();
    let path = options.file_path.clone();

    let fetcher = ConfigFetcher::new(EtagCache::new());
    let first_run = FirstRun {
        race: BootstrapRace::new(fetcher.clone(), Arc::new(ProxyDialer))
            .with_direct(Arc::new(LocalOrigin(origin))),
        servers: vec![ChainedServerInfo {
            addr: proxy.to_string(),
            ..Default::default()
        }],
    };

    let (manager, cfg) = ConfigManager::init(options, CloudPoller::new(fetcher), Some(first_run))
        .await
        .unwrap();

    assert_eq!(cfg.role, Some(Role::Client));
    let client = cfg.client.as_ref().unwrap();
    assert_eq!(client.fronted_servers.len(), 2);
    assert_eq!(client.fronted_servers[0].host, "a.fronted.test");
    for server in &client.fronted_servers {
        assert_eq!(server.qos, DEFAULT_QOS);
        assert_eq!(server.weight, DEFAULT_WEIGHT);
        assert_eq!(server.redial_attempts, 2);
    }
    assert_eq!(cfg.trusted_cas.len(), 1);
    assert_eq!(cfg.trusted_cas[0].common_name, "Test Root");
    assert_eq!(cfg.proxied_sites.as_ref().unwrap().cloud, vec!["a.com", "b.com"]);
    assert_eq!(cfg.stats.as_ref().unwrap().statshub_addr, "stats.test");

    assert_eq!(load_config(&path).unwrap(), *cfg);
    assert_eq!(manager.current(), cfg);
}

#[tokio::test]
async fn test_first_run_uses_race_winner() {
    let (proxy, seen) = start_mock_server(|_| MockResponse::config(CLOUD_DOC, "v1")).await;
    let dir = tempfile::tempdir().unwrap();
    let options = options(&dir);
    let path = options.file_path.clone();

    let fetcher = ConfigFetcher::new(EtagCache::new());
    let first_run = FirstRun {
        race: BootstrapRace::new(fetcher.clone(), Arc::new(ProxyDialer)),
        servers: vec![ChainedServerInfo {
            addr: proxy.to_string(),
            auth_token: "boot".into(),
            ..Default::default()
        }],
    };

    let (_manager, cfg) = ConfigManager::init(options, CloudPoller::new(fetcher.clone()), Some(first_run))
        .await
        .unwrap();

    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.trusted_cas.len(), 1);
    assert_eq!(cfg.client.as_ref().unwrap().fronted_servers[1].qos, DEFAULT_QOS);
    assert_eq!(load_config(&path).unwrap(), *cfg);

    assert_eq!(seen.lock().unwrap()[0].header("X-LANTERN-AUTH-TOKEN"), Some("boot"));
    assert_eq!(fetcher.etags().get(&cfg.cloud_config).as_deref(), Some("v1"));
}

#[tokio::test]
async fn test_bootstrap_timeout_when_every_path_fails() {
    let dead = start_failing_server().await;
    let dir = tempfile::tempdir().unwrap();
    let mut options = options(&dir);
    options.bootstrap_timeout = Some(Duration::from_millis(300));
    let path = options.file_path.clone();

    let fetcher = ConfigFetcher::new(EtagCache::new());
    let first_run = FirstRun {
        race: BootstrapRace::new(fetcher.clone(), Arc::new(ProxyDialer)),
        servers: vec![ChainedServerInfo {
            addr: dead.to_string(),
            ..Default::default()
        }],
    };

    let result = ConfigManager::init(options, CloudPoller::new(fetcher), Some(first_run)).await;
    assert!(matches!(result, Err(ConfigError::BootstrapTimeout(_))));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_no_bootstrap_paths_starts_from_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let (_manager, cfg) = ConfigManager::init(options(&dir), poller(Duration::from_secs(60)), None)
        .await
        .unwrap();

    assert_eq!(cfg.role, Some(Role::Client));
    let fronted = &cfg.client.as_ref().unwrap().fronted_servers;
    assert_eq!(fronted.len(), 1);
    assert_eq!(fronted[0].host, "nl.fallbacks.getiantem.org");
    assert!(!cfg.trusted_cas.is_empty());
}

#[tokio::test]
async fn test_malformed_mutation_leaves_live_config_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let options = options(&dir);
    let path = options.file_path.clone();
    let (manager, initial) = ConfigManager::init(options, poller(Duration::from_secs(60)), None)
        .await
        .unwrap();

    let result = manager
        .apply_mutation(Box::new(|live| merge(b"client: [unterminated", live)))
        .await;

    assert!(matches!(result, Err(ConfigError::Merge(_))));
    assert_eq!(manager.current(), initial);
    assert_eq!(load_config(&path).unwrap(), *initial);
}

#[tokio::test]
async fn test_unchanged_mutation_keeps_version() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, initial) = ConfigManager::init(options(&dir), poller(Duration::from_secs(60)), None)
        .await
        .unwrap();

    let same = manager.update(|live| Ok(live.clone())).await.unwrap();
    assert_eq!(same.version, initial.version);

    let changed = manager
        .update(|live| {
            let mut next = live.clone();
            next.addr = "127.0.0.1:9999".into();
            Ok(next)
        })
        .await
        .unwrap();
    assert_eq!(changed.version, initial.version + 1);

    let published = tokio::time::timeout(Duration::from_secs(1), manager.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(published.addr, "127.0.0.1:9999");
}

#[tokio::test]
async fn test_polling_publishes_update_then_sees_not_modified() {
    let (proxy, seen) = start_mock_server(|req| match req.header("X-Lantern-If-None-Match") {
        Some("e1") => MockResponse::status(304),
        _ => MockResponse::config(UPDATE_DOC, "e1"),
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("lantern-9.9.9.yaml"),
        "version: 3\nrole: client\naddr: 127.0.0.1:9000\n",
    )
    .unwrap();
    let (manager, initial) = ConfigManager::init(options(&dir), poller(Duration::from_millis(100)), None)
        .await
        .unwrap();
    assert_eq!(initial.version, 4);

    let shutdown = Shutdown::new();
    let egress = local_proxy_client(&proxy.to_string()).unwrap();
    let handle = manager.configure(egress.clone(), shutdown.subscribe());
    assert!(handle.is_some());
    assert!(manager.configure(egress, shutdown.subscribe()).is_none());

    let updated = tokio::time::timeout(Duration::from_secs(5), manager.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.version, 5);
    assert_eq!(updated.chained_server_count(), 1);
    assert_eq!(updated.addr, "127.0.0.1:9000");
    // The update names no fronted servers and carries a chained one, so no
    // fallback is added.
    assert!(updated.client.as_ref().unwrap().fronted_servers.is_empty());

    // Later polls are conditional and publish nothing.
    assert!(tokio::time::timeout(Duration::from_millis(500), manager.next())
        .await
        .is_err());
    {
        let seen = seen.lock().unwrap();
        assert!(seen.len() >= 2);
        assert_eq!(seen[0].target, initial.cloud_config);
        assert!(seen[0].header("X-LANTERN-AUTH-TOKEN").is_none());
        assert_eq!(seen.last().unwrap().header("X-Lantern-If-None-Match"), Some("e1"));
    }
    assert_eq!(manager.current().version, 5);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(2), handle.unwrap())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_external_file_edit_is_published() {
    let dir = tempfile::tempdir().unwrap();
    let options = options(&dir);
    let path = options.file_path.clone();
    let (manager, initial) = ConfigManager::init(options, poller(Duration::from_secs(60)), None)
        .await
        .unwrap();

    let shutdown = Shutdown::new();
    let _watcher = manager.watch_file(shutdown.subscribe()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut edited = (*initial).clone();
    edited.addr = "127.0.0.1:7777".into();
    save_config(&path, &edited).unwrap();

    let published = tokio::time::timeout(Duration::from_secs(5), manager.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(published.addr, "127.0.0.1:7777");
    assert_eq!(published.version, initial.version + 1);
    assert_eq!(manager.current(), published);
    assert_eq!(load_config(&path).unwrap(), *published);

    shutdown.trigger();
}

#[tokio::test]
async fn test_stale_file_written_after_update_is_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let options = options(&dir);
    let path = options.file_path.clone();
    let (manager, initial) = ConfigManager::init(options, poller(Duration::from_secs(60)), None)
        .await
        .unwrap();

    let shutdown = Shutdown::new();
    let _watcher = manager.watch_file(shutdown.subscribe()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let updated = manager
        .update(|live| {
            let mut next = live.clone();
            next.addr = "127.0.0.1:1111".into();
            Ok(next)
        })
        .await
        .unwrap();
    manager.next().await.unwrap();

    // An older snapshot lands on disk after the newer save.
    save_config(&path, &initial).unwrap();

    let mut restored = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if load_config(&path).map(|cfg| cfg == *updated).unwrap_or(false) {
            restored = true;
            break;
        }
    }
    assert!(restored, "stale file was not rewritten from memory");
    assert_eq!(manager.current(), updated);
    assert!(tokio::time::timeout(Duration::from_millis(300), manager.next())
        .await
        .is_err());

    shutdown.trigger();
}
