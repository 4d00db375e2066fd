//! First-run bootstrap race over mock chained proxies and a fronted origin.

mod common;

use common::{start_failing_server, start_mock_server, MockResponse, Requests};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lantern_config::cloud::bootstrap::{BootstrapRace, RacePath};
use lantern_config::cloud::etag::EtagCache;
use lantern_config::cloud::fetch::ConfigFetcher;
use lantern_config::config::schema::{ChainedServerInfo, Masquerade};
use lantern_config::net::dialer::ProxyDialer;
use lantern_config::net::fronted::MasqueradeFetcher;

fn chained(addr: SocketAddr, token: &str) -> ChainedServerInfo {
    ChainedServerInfo {
        addr: addr.to_string(),
        auth_token: token.to_string(),
        ..Default::default()
    }
}

fn race() -> BootstrapRace {
    BootstrapRace::new(ConfigFetcher::new(EtagCache::new()), Arc::new(ProxyDialer))
}

fn fronted_via_localhost() -> Arc<MasqueradeFetcher> {
    Arc::new(MasqueradeFetcher::new(&[], vec![Masquerade::new("front.test", "127.0.0.1")]).unwrap())
}

async fn wait_for_requests(requests: &Requests, count: usize) -> bool {
    for _ in 0..100 {
        if requests.lock().unwrap().len() >= count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_race_delivers_one_successful_payload() {
    let (proxy_a, seen_a) = start_mock_server(|_| MockResponse::config("addr: a\n", "a")).await;
    let (proxy_b, seen_b) = start_mock_server(|_| MockResponse::config("addr: b\n", "b")).await;
    let (proxy_c, seen_c) = start_mock_server(|_| MockResponse::status(503)).await;
    let (origin, seen_direct) =
        start_mock_server(|_| MockResponse::config("addr: direct\n", "d")).await;

    let url = format!("http://config.test:{}/cloud.yaml.gz", origin.port());
    let servers = vec![
        chained(proxy_a, "tok-a"),
        chained(proxy_b, "tok-b"),
        chained(proxy_c, "tok-c"),
    ];

    let race = race().with_direct(fronted_via_localhost());
    let winner = tokio::time::timeout(Duration::from_secs(10), race.run(servers, &url))
        .await
        .expect("race should produce a winner");

    let body = String::from_utf8(winner.body.clone()).unwrap();
    match winner.path {
        RacePath::Chained => {
            assert!(winner.source == proxy_a.to_string() || winner.source == proxy_b.to_string());
            let expected = if winner.source == proxy_a.to_string() { "addr: a\n" } else { "addr: b\n" };
            assert_eq!(body, expected);
        }
        RacePath::Direct => {
            assert_eq!(winner.source, url);
            assert_eq!(body, "addr: direct\n");
        }
    }

    // Losers are not cancelled: every attempt reaches its server.
    for seen in [&seen_a, &seen_b, &seen_c, &seen_direct] {
        assert!(wait_for_requests(seen, 1).await);
    }
}

#[tokio::test]
async fn test_chained_attempt_is_proxied_with_auth_token() {
    let (proxy, seen) = start_mock_server(|_| MockResponse::config("addr: chained\n", "c")).await;
    let url = "http://config.test/cloud.yaml.gz";

    let winner = tokio::time::timeout(
        Duration::from_secs(10),
        race().run(vec![chained(proxy, "secret")], url),
    )
    .await
    .unwrap();

    assert_eq!(winner.path, RacePath::Chained);
    assert_eq!(winner.body, b"addr: chained\n");

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].target, url);
    assert_eq!(seen[0].header("X-LANTERN-AUTH-TOKEN"), Some("secret"));
    assert_eq!(seen[0].header("Cache-Control"), Some("no-cache"));
}

#[tokio::test]
async fn test_direct_path_wins_when_chained_servers_fail() {
    let dead = start_failing_server().await;
    let (origin, seen) = start_mock_server(|_| MockResponse::config("addr: direct\n", "d")).await;
    let url = format!("http://config.test:{}/cloud.yaml.gz", origin.port());

    let servers = vec![chained(dead, ""), ChainedServerInfo::default()];
    let race = race().with_direct(fronted_via_localhost());
    let winner = tokio::time::timeout(Duration::from_secs(10), race.run(servers, &url))
        .await
        .unwrap();

    assert_eq!(winner.path, RacePath::Direct);
    assert_eq!(winner.body, b"addr: direct\n");

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].target, "/cloud.yaml.gz");
    assert_eq!(seen[0].header("Host"), Some(format!("config.test:{}", origin.port()).as_str()));
}

#[tokio::test]
async fn test_race_never_completes_when_every_attempt_fails() {
    let (proxy, _seen) = start_mock_server(|_| MockResponse::status(500)).await;
    let dead = start_failing_server().await;

    let servers = vec![chained(proxy, ""), chained(dead, "")];
    let result = tokio::time::timeout(
        Duration::from_millis(500),
        race().run(servers, "http://config.test/cloud.yaml.gz"),
    )
    .await;

    assert!(result.is_err());
}
