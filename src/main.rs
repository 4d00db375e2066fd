//! Cloud configuration daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   first run                                   every session
//!  ┌──────────────────────────────┐            ┌────────────────────────┐
//!  │ chained #1 ─┐                │            │ lantern-<ver>.yaml     │
//!  │ chained #2 ─┼─▶ race ─▶ merge│──defaults─▶│  (load / salvage old)  │
//!  │ direct    ──┘                │            └───────────┬────────────┘
//!  └──────────────────────────────┘                        │
//!                                                          ▼
//!                ┌─────────────┐  mutation   ┌────────────────────────┐
//!   egress ─────▶│ cloud poll  │────────────▶│ config manager         │──▶ next()
//!   (local proxy)│ (ETag, 304) │◀── jitter ──│ merge→defaults→save    │
//!                └─────────────┘             └────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use lantern_config::config::defaults::{DefaultSettings, DEFAULT_STATSHUB_ADDR};
use lantern_config::lifecycle::signals::shutdown_signal;
use lantern_config::lifecycle::startup::{start, StartupOptions};
use lantern_config::net::dialer::local_proxy_client;
use lantern_config::observability::{logging, metrics};
use lantern_config::Shutdown;

#[derive(Parser)]
#[command(name = "lantern-config")]
#[command(about = "Bootstraps and refreshes the proxy's cloud configuration", long_about = None)]
struct Cli {
    /// Directory holding lantern-<version>.yaml (defaults to the OS config dir)
    #[arg(long)]
    configdir: Option<PathBuf>,

    /// Application version used to name the config file
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
    app_version: String,

    /// YAML file with the packaged chained servers used on first run
    #[arg(long)]
    bootstrap_settings: Option<PathBuf>,

    /// Give up on the first-run bootstrap after this many seconds
    #[arg(long)]
    bootstrap_timeout_secs: Option<u64>,

    /// Stats hub address used when the config names none
    #[arg(long, default_value = DEFAULT_STATSHUB_ADDR)]
    statshub_addr: String,

    /// Proxy to poll through (defaults to the config's listen address)
    #[arg(long)]
    egress_proxy: Option<String>,

    /// Poll the cloud config without going through a proxy
    #[arg(long)]
    no_egress_proxy: bool,

    /// Do not add a locale fallback fronted server to clients without servers
    #[arg(long)]
    no_fallback_server: bool,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_address: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_logging();

    tracing::info!(version = %cli.app_version, "lantern-config starting");

    if let Some(addr) = cli.metrics_address {
        metrics::init_metrics(addr);
    }

    let mut options = StartupOptions::new(&cli.app_version);
    options.config_dir = cli.configdir;
    options.bootstrap_settings = cli.bootstrap_settings;
    options.bootstrap_timeout = cli.bootstrap_timeout_secs.map(Duration::from_secs);
    options.defaults = DefaultSettings {
        statshub_addr: cli.statshub_addr,
        territory: None,
        fallback_server: !cli.no_fallback_server,
    };

    let (manager, initial) = start(options).await?;
    tracing::info!(
        version = initial.version,
        role = initial.role.map(|r| r.as_str()).unwrap_or("unknown"),
        cloud_config = %initial.cloud_config,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let _watcher = manager.watch_file(shutdown.subscribe())?;

    let egress = if cli.no_egress_proxy {
        reqwest::Client::builder().build()?
    } else {
        let proxy = cli.egress_proxy.unwrap_or_else(|| initial.addr.clone());
        local_proxy_client(&proxy)?
    };
    let poller = manager.configure(egress, shutdown.subscribe());

    let signal = shutdown_signal();
    tokio::pin!(signal);
    loop {
        tokio::select! {
            next = manager.next() => match next {
                Some(cfg) => tracing::info!(
                    version = cfg.version,
                    chained_servers = cfg.chained_server_count(),
                    trusted_cas = cfg.trusted_cas.len(),
                    "Configuration updated"
                ),
                None => break,
            },
            _ = &mut signal => break,
        }
    }

    shutdown.trigger();
    if let Some(handle) = poller {
        let _ = handle.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
