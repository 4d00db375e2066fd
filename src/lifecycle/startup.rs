//! Startup orchestration.
//!
//! # Responsibilities
//! - Resolve the config directory and file for this application version
//! - Salvage a customized config from an older version
//! - Build the shared ETag cache, fetcher, poller and bootstrap race
//! - Initialize the config manager

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cloud::bootstrap::{BootstrapRace, BootstrapServers};
use crate::cloud::etag::EtagCache;
use crate::cloud::fetch::ConfigFetcher;
use crate::cloud::poll::{CloudPoller, CLOUD_CONFIG_POLL_INTERVAL};
use crate::config::defaults::{cloudfront_masquerades, default_trusted_cas, DefaultSettings};
use crate::config::loader::ConfigError;
use crate::config::manager::{ConfigManager, FirstRun, ManagerOptions};
use crate::config::migration::{config_file_name, copy_good_old_config, in_config_dir};
use crate::config::schema::{ChainedServerInfo, Configuration};
use crate::net::dialer::ProxyDialer;
use crate::net::fronted::MasqueradeFetcher;

/// Everything needed to bring the configuration system up.
#[derive(Debug, Clone)]
pub struct StartupOptions {
    /// Overrides the platform config directory.
    pub config_dir: Option<PathBuf>,
    /// Application version; selects `lantern-<version>.yaml`.
    pub app_version: String,
    /// Packaged chained servers for first run.
    pub bootstrap_settings: Option<PathBuf>,
    pub bootstrap_timeout: Option<Duration>,
    pub poll_interval: Duration,
    pub defaults: DefaultSettings,
}

impl StartupOptions {
    pub fn new(app_version: &str) -> Self {
        Self {
            config_dir: None,
            app_version: app_version.to_string(),
            bootstrap_settings: None,
            bootstrap_timeout: None,
            poll_interval: CLOUD_CONFIG_POLL_INTERVAL,
            defaults: DefaultSettings::default(),
        }
    }
}

/// Assemble and initialize the config manager.
pub async fn start(
    options: StartupOptions,
) -> Result<(Arc<ConfigManager>, Arc<Configuration>), ConfigError> {
    let filename = config_file_name(&options.app_version);
    let (dir, path) = in_config_dir(options.config_dir.as_deref(), &filename)?;
    copy_good_old_config(&dir, &path);

    let fetcher = ConfigFetcher::new(EtagCache::new());
    let poller = CloudPoller::with_interval(fetcher.clone(), options.poll_interval);

    let first_run = if path.exists() {
        None
    } else {
        Some(prepare_first_run(&options, fetcher)?)
    };

    let manager_options = ManagerOptions {
        file_path: path,
        bootstrap_timeout: options.bootstrap_timeout,
        defaults: options.defaults,
    };
    ConfigManager::init(manager_options, poller, first_run).await
}

fn prepare_first_run(options: &StartupOptions, fetcher: ConfigFetcher) -> Result<FirstRun, ConfigError> {
    let servers: Vec<ChainedServerInfo> = match &options.bootstrap_settings {
        Some(path) => BootstrapServers::load(path)?
            .chained_servers
            .into_values()
            .collect(),
        None => Vec::new(),
    };
    tracing::debug!(chained_servers = servers.len(), "Bootstrap settings has chained servers");

    let mut race = BootstrapRace::new(fetcher, Arc::new(ProxyDialer));
    let certs: Vec<String> = default_trusted_cas().into_iter().map(|ca| ca.cert).collect();
    match MasqueradeFetcher::new(&certs, cloudfront_masquerades()) {
        Ok(direct) => race = race.with_direct(Arc::new(direct)),
        Err(e) => tracing::error!(error = %e, "Could not create direct domain fronter"),
    }

    Ok(FirstRun { race, servers })
}
