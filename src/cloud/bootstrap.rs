//! First-run bootstrap race.
//!
//! # Data Flow
//! ```text
//! chained server 1 ──dial──▶ fetch ──┐
//! chained server 2 ──dial──▶ fetch ──┤
//!        ...                         ├──▶ WinnerSlot (first success only) ──▶ run()
//! direct (masquerade) ─────▶ fetch ──┘
//! ```
//!
//! Attempts are spawned as independent tasks. The first success to pass the
//! slot's gate wins; later successes are discarded and failures are logged.
//! Losing attempts are not cancelled and run to completion in the
//! background.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cloud::fetch::ConfigFetcher;
use crate::config::loader::ConfigError;
use crate::config::schema::ChainedServerInfo;
use crate::net::dialer::DialerFactory;
use crate::net::fronted::DirectFetcher;
use crate::observability::metrics;

/// Chained servers packaged with the application for first run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BootstrapServers {
    #[serde(rename = "chainedservers")]
    pub chained_servers: BTreeMap<String, ChainedServerInfo>,
}

impl BootstrapServers {
    /// Read the packaged bootstrap settings YAML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings_err = |reason: String| ConfigError::BootstrapSettings {
            path: path.to_path_buf(),
            reason,
        };
        let content = std::fs::read(path).map_err(|e| settings_err(e.to_string()))?;
        let servers: BootstrapServers =
            serde_yaml::from_slice(&content).map_err(|e| settings_err(e.to_string()))?;
        tracing::debug!(count = servers.chained_servers.len(), "Bootstrap settings loaded");
        Ok(servers)
    }
}

/// Which kind of path delivered the winning payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RacePath {
    Chained,
    Direct,
}

impl RacePath {
    pub fn as_str(&self) -> &'static str {
        match self {
            RacePath::Chained => "chained",
            RacePath::Direct => "direct",
        }
    }
}

/// The payload that won the race.
#[derive(Debug, Clone)]
pub struct RaceWinner {
    pub path: RacePath,
    /// Chained server address, or the URL for the direct path.
    pub source: String,
    pub body: Vec<u8>,
}

/// Single-slot result channel behind a compare-and-swap gate.
struct WinnerSlot {
    delivered: AtomicBool,
    tx: mpsc::Sender<RaceWinner>,
}

impl WinnerSlot {
    fn new(tx: mpsc::Sender<RaceWinner>) -> Self {
        Self {
            delivered: AtomicBool::new(false),
            tx,
        }
    }

    /// Deliver `winner` if nobody has yet. Returns whether it won.
    fn offer(&self, winner: RaceWinner) -> bool {
        if self
            .delivered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        // Capacity 1 and a single successful gate pass: this cannot be full.
        self.tx.try_send(winner).is_ok()
    }
}

/// Races every chained server and the direct path for the first config.
pub struct BootstrapRace {
    fetcher: ConfigFetcher,
    dialer: Arc<dyn DialerFactory>,
    direct: Option<Arc<dyn DirectFetcher>>,
}

impl BootstrapRace {
    pub fn new(fetcher: ConfigFetcher, dialer: Arc<dyn DialerFactory>) -> Self {
        Self {
            fetcher,
            dialer,
            direct: None,
        }
    }

    /// Also race a direct domain-fronted fetch.
    pub fn with_direct(mut self, direct: Arc<dyn DirectFetcher>) -> Self {
        self.direct = Some(direct);
        self
    }

    /// Run the race for `url` and return the first successful payload.
    ///
    /// Never returns if every attempt fails; bound it with a timeout.
    pub async fn run<I>(&self, servers: I, url: &str) -> RaceWinner
    where
        I: IntoIterator<Item = ChainedServerInfo>,
    {
        let (tx, mut rx) = mpsc::channel(1);
        let slot = Arc::new(WinnerSlot::new(tx));
        let mut attempts = 0usize;

        for server in servers {
            attempts += 1;
            let slot = slot.clone();
            let fetcher = self.fetcher.clone();
            let dialer = self.dialer.clone();
            let url = url.to_string();
            tokio::spawn(async move {
                fetch_chained(server, fetcher, dialer, url, slot).await;
            });
        }

        if let Some(direct) = &self.direct {
            attempts += 1;
            let slot = slot.clone();
            let fetcher = self.fetcher.clone();
            let direct = direct.clone();
            let url = url.to_string();
            tokio::spawn(async move {
                fetch_direct(direct, fetcher, url, slot).await;
            });
        }

        tracing::info!(attempts, url = %url, "Bootstrap race started");
        drop(slot);

        match rx.recv().await {
            Some(winner) => {
                tracing::info!(path = winner.path.as_str(), source = %winner.source, "Bootstrap race won");
                metrics::record_bootstrap_winner(winner.path.as_str());
                winner
            }
            None => {
                tracing::error!(attempts, "Every bootstrap attempt failed");
                std::future::pending().await
            }
        }
    }
}

async fn fetch_chained(
    server: ChainedServerInfo,
    fetcher: ConfigFetcher,
    dialer: Arc<dyn DialerFactory>,
    url: String,
    slot: Arc<WinnerSlot>,
) {
    tracing::debug!(addr = %server.addr, "Fetching config using chained server");
    let client = match dialer.transport(&server) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(addr = %server.addr, error = %e, "Unable to configure chained server");
            return;
        }
    };

    match fetcher.fetch(&client, &url, &server.auth_token).await {
        Ok(Some(body)) => {
            tracing::debug!(addr = %server.addr, "Successfully downloaded custom config");
            slot.offer(RaceWinner {
                path: RacePath::Chained,
                source: server.addr,
                body,
            });
        }
        Ok(None) => {
            tracing::debug!(addr = %server.addr, "Chained server reported config unchanged");
        }
        Err(e) => {
            tracing::warn!(addr = %server.addr, error = %e, "Chained bootstrap fetch failed");
        }
    }
}

async fn fetch_direct(
    direct: Arc<dyn DirectFetcher>,
    fetcher: ConfigFetcher,
    url: String,
    slot: Arc<WinnerSlot>,
) {
    let response = match direct.response(&url).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "Could not get response with direct domain fronter");
            return;
        }
    };
    tracing::debug!("Got response with direct domain fronter");

    match fetcher.read_config_response(&url, response).await {
        Ok(Some(body)) => {
            slot.offer(RaceWinner {
                path: RacePath::Direct,
                source: url,
                body,
            });
        }
        Ok(None) => tracing::debug!("Direct fetch reported config unchanged"),
        Err(e) => tracing::warn!(error = %e, "Error reading direct response body"),
    }
}
