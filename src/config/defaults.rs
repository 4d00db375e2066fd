//! Defaults for a minimum viable configuration.
//!
//! Every branch is gated on the field being empty, zero or absent, so
//! applying defaults twice is the same as applying them once.

use uuid::Uuid;

use crate::config::schema::{
    ClientConfig, Configuration, FrontedServerInfo, Masquerade, ProxiedSitesConfig,
    ProxiedSitesDelta, Role, StatsConfig, TrustedCa,
};

/// Served over plain HTTP because proxies do not forward X-Forwarded-For with HTTPS.
pub const DEFAULT_CLOUD_CONFIG_URL: &str = "http://d2wi0vwulmtn99.cloudfront.net/cloud.yaml.gz";
pub const DEFAULT_ADDR: &str = "127.0.0.1:8787";
pub const DEFAULT_UI_ADDR: &str = "127.0.0.1:16823";
pub const DEFAULT_STATSHUB_ADDR: &str = "pure-journey-3547.herokuapp.com";

/// Masquerade set used when a client has none.
pub const CLOUDFLARE: &str = "cloudflare";
/// Masquerade set used by the direct bootstrap path.
pub const CLOUDFRONT: &str = "cloudfront";

pub const DEFAULT_QOS: i32 = 5;
pub const DEFAULT_WEIGHT: u32 = 100;
pub const DEFAULT_REDIAL_ATTEMPTS: u32 = 2;

const FALLBACK_QOS: i32 = 10;
const FALLBACK_WEIGHT: u32 = 4000;
const FALLBACK_MAX_MASQUERADES: u32 = 20;

/// Inputs to the defaults pass that come from outside the document.
#[derive(Debug, Clone)]
pub struct DefaultSettings {
    /// Stats hub used when the document names none.
    pub statshub_addr: String,

    /// Locale territory (ISO 3166 code); detected from the environment when unset.
    pub territory: Option<String>,

    /// Add a locale fallback fronted server to clients that have neither
    /// fronted nor chained servers.
    pub fallback_server: bool,
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            statshub_addr: DEFAULT_STATSHUB_ADDR.to_string(),
            territory: None,
            fallback_server: true,
        }
    }
}

/// Populate defaults so that a partially specified document is runnable.
pub fn apply_defaults(cfg: &mut Configuration, settings: &DefaultSettings) {
    if cfg.role.is_none() {
        cfg.role = Some(Role::Client);
    }

    if cfg.addr.is_empty() {
        cfg.addr = DEFAULT_ADDR.to_string();
    }

    if cfg.ui_addr.is_empty() {
        cfg.ui_addr = DEFAULT_UI_ADDR.to_string();
    }

    if cfg.cloud_config.is_empty() {
        cfg.cloud_config = DEFAULT_CLOUD_CONFIG_URL.to_string();
    }

    if cfg.instance_id.is_empty() {
        cfg.instance_id = Uuid::new_v4().to_string();
    }

    let stats = cfg.stats.get_or_insert_with(StatsConfig::default);
    if stats.statshub_addr.is_empty() {
        stats.statshub_addr = settings.statshub_addr.clone();
    }

    if cfg.role == Some(Role::Client) {
        apply_client_defaults(cfg, settings);
    }

    let sites = cfg.proxied_sites.get_or_insert_with(|| {
        tracing::debug!("Adding empty proxiedsites");
        ProxiedSitesConfig {
            delta: Some(ProxiedSitesDelta::default()),
            cloud: Vec::new(),
        }
    });
    if sites.cloud.is_empty() {
        tracing::debug!("Loading default cloud proxiedsites");
        sites.cloud = default_proxied_sites();
    }

    if cfg.trusted_cas.is_empty() {
        cfg.trusted_cas = default_trusted_cas();
    }
}

fn apply_client_defaults(cfg: &mut Configuration, settings: &DefaultSettings) {
    let client = cfg.client.get_or_insert_with(ClientConfig::default);

    if client.masquerade_sets.is_empty() {
        client
            .masquerade_sets
            .insert(CLOUDFLARE.to_string(), cloudflare_masquerades());
    }

    if settings.fallback_server
        && client.fronted_servers.is_empty()
        && client.chained_servers.is_empty()
    {
        let territory = settings
            .territory
            .clone()
            .unwrap_or_else(detect_territory);
        client.fronted_servers.push(FrontedServerInfo {
            host: fallback_host_for_territory(&territory),
            port: 443,
            masquerade_set: CLOUDFLARE.to_string(),
            max_masquerades: FALLBACK_MAX_MASQUERADES,
            qos: FALLBACK_QOS,
            weight: FALLBACK_WEIGHT,
            trusted: true,
            ..Default::default()
        });
    }

    for server in client.fronted_servers.iter_mut() {
        if server.qos == 0 {
            server.qos = DEFAULT_QOS;
        }
        if server.weight == 0 {
            server.weight = DEFAULT_WEIGHT;
        }
        if server.redial_attempts == 0 {
            server.redial_attempts = DEFAULT_REDIAL_ATTEMPTS;
        }
    }

    client.sort_servers();

    if cfg.auto_report.is_none() {
        cfg.auto_report = Some(true);
    }
    if cfg.auto_launch.is_none() {
        cfg.auto_launch = Some(true);
    }
}

/// Territory from `LC_ALL`/`LANG` (`en_US.UTF-8` → `us`), `us` when unknown.
pub fn detect_territory() -> String {
    ["LC_ALL", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find_map(|locale| territory_from_locale(&locale))
        .unwrap_or_else(|| "us".to_string())
}

fn territory_from_locale(locale: &str) -> Option<String> {
    let tag = locale.split(['.', '@']).next()?;
    let (_, territory) = tag.split_once(['_', '-'])?;
    if territory.len() == 2 {
        Some(territory.to_lowercase())
    } else {
        None
    }
}

/// Round-robin fallback host for the data center closest to `territory`.
pub fn fallback_host_for_territory(territory: &str) -> String {
    let datacenter = if territory.eq_ignore_ascii_case("cn") {
        "jp"
    } else {
        "nl"
    };
    tracing::debug!(territory = %territory, datacenter, "Selected fallback data center");
    format!("{}.fallbacks.getiantem.org", datacenter)
}

/// Built-in front domains for the `cloudflare` set.
pub fn cloudflare_masquerades() -> Vec<Masquerade> {
    vec![
        Masquerade::new("cdnjs.cloudflare.com", "104.16.18.94"),
        Masquerade::new("www.cloudflare.com", "104.16.124.96"),
        Masquerade::new("blog.cloudflare.com", "104.18.28.7"),
        Masquerade::new("support.cloudflare.com", "104.16.53.111"),
    ]
}

/// Built-in front domains for the `cloudfront` set.
pub fn cloudfront_masquerades() -> Vec<Masquerade> {
    vec![
        Masquerade::new("d1jwpcr0q4pcq0.cloudfront.net", "54.230.9.121"),
        Masquerade::new("d1vxjh6ndbqslv.cloudfront.net", "54.182.2.48"),
        Masquerade::new("d2q1vna75dc892.cloudfront.net", "54.239.200.73"),
        Masquerade::new("d3g0gp89917ko0.cloudfront.net", "54.230.8.187"),
    ]
}

/// Built-in cloud proxied-sites list, already sorted and deduplicated.
pub fn default_proxied_sites() -> Vec<String> {
    let mut sites: Vec<String> = [
        "blogspot.com",
        "facebook.com",
        "google.com",
        "googleusercontent.com",
        "gstatic.com",
        "instagram.com",
        "twitter.com",
        "wikipedia.org",
        "youtube.com",
        "ytimg.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    sites.sort();
    sites
}

/// Built-in trusted certificate authorities.
pub fn default_trusted_cas() -> Vec<TrustedCa> {
    [
        ("DigiCert Global Root G2", include_str!("certs/DigiCert_Global_Root_G2.pem")),
        ("GlobalSign Root CA", include_str!("certs/GlobalSign_Root_CA.pem")),
        ("ISRG Root X1", include_str!("certs/ISRG_Root_X1.pem")),
    ]
    .iter()
    .map(|(name, pem)| TrustedCa {
        common_name: name.to_string(),
        cert: pem.to_string(),
    })
    .collect()
}
