//! Versioned configuration manager.
//!
//! Owns the live configuration and its file. Every accepted change is
//! built as a new value, defaulted, validated, given the next version,
//! saved, swapped in atomically and published to [`ConfigManager::next`].

use arc_swap::{ArcSwap, ArcSwapOption};
use notify::RecommendedWatcher;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::cloud::bootstrap::BootstrapRace;
use crate::cloud::poll::{CloudPoller, Mutation};
use crate::config::defaults::{apply_defaults, DefaultSettings};
use crate::config::loader::{load_config, save_config, ConfigError};
use crate::config::merge::merge;
use crate::config::schema::{ChainedServerInfo, Configuration};
use crate::config::validation::validate_config;
use crate::config::watcher::ConfigWatcher;
use crate::observability::metrics;

/// Settings for a [`ConfigManager`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Path of the `lantern-<version>.yaml` file.
    pub file_path: PathBuf,
    /// Upper bound on the first-run bootstrap race; unbounded when `None`.
    pub bootstrap_timeout: Option<Duration>,
    pub defaults: DefaultSettings,
}

impl ManagerOptions {
    pub fn new(file_path: PathBuf) -> Self {
        Self {
            file_path,
            bootstrap_timeout: None,
            defaults: DefaultSettings::default(),
        }
    }
}

/// How to obtain the first configuration when no file exists yet.
pub struct FirstRun {
    pub race: BootstrapRace,
    pub servers: Vec<ChainedServerInfo>,
}

pub struct ConfigManager {
    options: ManagerOptions,
    poller: CloudPoller,
    current: ArcSwap<Configuration>,
    /// Serializes mutations, polls and reloads.
    write_lock: Mutex<()>,
    updates_tx: mpsc::UnboundedSender<Arc<Configuration>>,
    updates_rx: Mutex<mpsc::UnboundedReceiver<Arc<Configuration>>>,
    egress: ArcSwapOption<reqwest::Client>,
    polling: AtomicBool,
}

impl ConfigManager {
    /// Load the config file, or run first-run setup when there is none,
    /// then apply per-session defaults and persist the result.
    pub async fn init(
        options: ManagerOptions,
        poller: CloudPoller,
        first_run: Option<FirstRun>,
    ) -> Result<(Arc<Self>, Arc<Configuration>), ConfigError> {
        let path = options.file_path.clone();

        let (mut cfg, on_disk) = if path.exists() {
            let loaded = load_config(&path)?;
            tracing::debug!(path = %path.display(), version = loaded.version, "Loaded existing config");
            (loaded.clone(), Some(loaded))
        } else {
            tracing::debug!("Running first run setup");
            (Self::first_run_setup(&options, first_run).await?, None)
        };

        apply_defaults(&mut cfg, &options.defaults);
        validate_config(&cfg).map_err(ConfigError::Validation)?;

        if on_disk.as_ref() != Some(&cfg) {
            cfg.version += 1;
            save_config(&path, &cfg)?;
        }
        metrics::record_config_version(cfg.version);

        let initial = Arc::new(cfg);
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            options,
            poller,
            current: ArcSwap::new(initial.clone()),
            write_lock: Mutex::new(()),
            updates_tx,
            updates_rx: Mutex::new(updates_rx),
            egress: ArcSwapOption::empty(),
            polling: AtomicBool::new(false),
        });

        tracing::info!(version = initial.version, path = %path.display(), "Configuration initialized");
        Ok((manager, initial))
    }

    async fn first_run_setup(
        options: &ManagerOptions,
        first_run: Option<FirstRun>,
    ) -> Result<Configuration, ConfigError> {
        let mut cfg = Configuration::default();
        apply_defaults(&mut cfg, &options.defaults);

        let Some(FirstRun { race, servers }) = first_run else {
            tracing::warn!("No bootstrap paths configured; starting from defaults");
            return Ok(cfg);
        };

        tracing::debug!(chained_servers = servers.len(), "Bootstrapping cloud configuration");
        let url = cfg.cloud_config.clone();
        let winner = match options.bootstrap_timeout {
            Some(limit) => tokio::time::timeout(limit, race.run(servers, &url))
                .await
                .map_err(|_| ConfigError::BootstrapTimeout(limit))?,
            None => race.run(servers, &url).await,
        };

        Ok(merge(&winner.body, &cfg)?)
    }

    /// The live configuration.
    pub fn current(&self) -> Arc<Configuration> {
        self.current.load_full()
    }

    /// Wait for the next accepted configuration.
    pub async fn next(&self) -> Option<Arc<Configuration>> {
        self.updates_rx.lock().await.recv().await
    }

    /// Apply `mutate` to the live configuration.
    ///
    /// On error nothing is saved or published and the live configuration
    /// stays as it was. A mutation that changes nothing is not published.
    pub async fn update<F>(&self, mutate: F) -> Result<Arc<Configuration>, ConfigError>
    where
        F: FnOnce(&Configuration) -> Result<Configuration, ConfigError>,
    {
        let _guard = self.write_lock.lock().await;
        let live = self.current.load_full();
        let next = mutate(&live)?;
        self.commit(live, next)
    }

    /// Default, validate, version, save and publish `next` as the successor
    /// of `live`. Callers hold `write_lock`.
    fn commit(
        &self,
        live: Arc<Configuration>,
        mut next: Configuration,
    ) -> Result<Arc<Configuration>, ConfigError> {
        apply_defaults(&mut next, &self.options.defaults);
        validate_config(&next).map_err(ConfigError::Validation)?;

        next.version = live.version;
        if next == *live {
            tracing::debug!("Mutation produced no change");
            return Ok(live);
        }
        next.version = live.version + 1;

        save_config(&self.options.file_path, &next)?;
        let next = Arc::new(next);
        self.publish(next.clone());
        Ok(next)
    }

    /// Apply a mutation produced by the cloud poller.
    pub async fn apply_mutation(&self, mutation: Mutation) -> Result<Arc<Configuration>, ConfigError> {
        let result = self
            .update(|live| mutation(live).map_err(ConfigError::from))
            .await;
        match &result {
            Ok(_) => metrics::record_merge("applied"),
            Err(e) => {
                metrics::record_merge("rejected");
                tracing::warn!(error = %e, "Rejected cloud configuration update");
            }
        }
        result
    }

    fn publish(&self, cfg: Arc<Configuration>) {
        tracing::info!(version = cfg.version, "Publishing updated configuration");
        metrics::record_config_version(cfg.version);
        self.current.store(cfg.clone());
        let _ = self.updates_tx.send(cfg);
    }

    /// Hand over the egress client used for polling.
    ///
    /// The first call starts the polling loop; later calls only replace the
    /// client used by subsequent ticks.
    pub fn configure(
        self: &Arc<Self>,
        egress: reqwest::Client,
        shutdown: broadcast::Receiver<()>,
    ) -> Option<JoinHandle<()>> {
        self.egress.store(Some(Arc::new(egress)));
        if self.polling.swap(true, Ordering::AcqRel) {
            return None;
        }

        let manager = self.clone();
        Some(tokio::spawn(async move {
            manager.poll_loop(shutdown).await;
        }))
    }

    async fn poll_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("Cloud config polling started");
        loop {
            let next_wait = match self.egress.load_full() {
                Some(egress) => self.poll_once(&egress).await,
                None => self.poller.next_wait(),
            };

            tokio::select! {
                _ = tokio::time::sleep(next_wait) => {}
                _ = shutdown.recv() => {
                    tracing::info!("Cloud config polling received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn poll_once(&self, egress: &reqwest::Client) -> Duration {
        let snapshot = self.current();
        let outcome = self.poller.poll(&snapshot, egress).await;
        match outcome.result {
            Ok(Some(mutation)) => {
                let _ = self.apply_mutation(mutation).await;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, wait = ?outcome.next_wait, "Cloud config poll failed; retrying next tick");
            }
        }
        outcome.next_wait
    }

    /// Watch the config file for edits made outside this process.
    ///
    /// The returned watcher must be kept alive for as long as edits should
    /// be picked up.
    pub fn watch_file(
        self: &Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<RecommendedWatcher, notify::Error> {
        let (watcher, mut rx) = ConfigWatcher::new(&self.options.file_path);
        let handle = watcher.run()?;

        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    loaded = rx.recv() => match loaded {
                        Some(cfg) => manager.reload_from_disk(cfg).await,
                        None => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
        });
        Ok(handle)
    }

    /// Accept an edit of the config file made outside this process.
    ///
    /// Only a file carrying the live version is an edit of the live
    /// configuration. Any other version is a snapshot that lost a race with
    /// a newer save, and the file is rewritten from memory. An accepted edit
    /// goes through the same path as [`ConfigManager::update`].
    async fn reload_from_disk(&self, cfg: Configuration) {
        let _guard = self.write_lock.lock().await;
        let live = self.current.load_full();

        if cfg.version != live.version {
            tracing::warn!(
                file_version = cfg.version,
                live_version = live.version,
                "Config file version does not match live config; rewriting file"
            );
            if let Err(e) = save_config(&self.options.file_path, &live) {
                tracing::error!(error = %e, "Unable to rewrite config file");
            }
            return;
        }

        match self.commit(live, cfg) {
            Ok(accepted) => {
                tracing::info!(version = accepted.version, "Config file edited externally");
            }
            Err(e) => tracing::error!(error = %e, "Ignoring invalid config file edit"),
        }
    }
}
