//! Configuration schema definitions.
//!
//! This module defines the complete configuration document distributed by the
//! cloud config source. All types derive Serde traits; YAML keys are the
//! lowercased field names used by the deployed config files
//! (`frontedservers`, `chainedservers`, `trustedcas`, ...).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role of the running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Server => "server",
        }
    }
}

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Configuration {
    /// Monotonically assigned by the config manager on every accepted change.
    pub version: u64,

    /// URL of the cloud configuration document.
    #[serde(rename = "cloudconfig")]
    pub cloud_config: String,

    /// Optional PEM pinned for the cloud config source.
    #[serde(rename = "cloudconfigca")]
    pub cloud_config_ca: String,

    /// Local proxy listen address.
    pub addr: String,

    pub role: Option<Role>,

    #[serde(rename = "instanceid")]
    pub instance_id: String,

    #[serde(rename = "cpuprofile")]
    pub cpu_profile: String,

    #[serde(rename = "memprofile")]
    pub mem_profile: String,

    /// UI HTTP server address.
    #[serde(rename = "uiaddr")]
    pub ui_addr: String,

    /// Report anonymous usage.
    #[serde(rename = "autoreport", skip_serializing_if = "Option::is_none")]
    pub auto_report: Option<bool>,

    /// Launch automatically on system startup.
    #[serde(rename = "autolaunch", skip_serializing_if = "Option::is_none")]
    pub auto_launch: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientConfig>,

    /// Domains routed through the proxy rather than accessed directly.
    #[serde(rename = "proxiedsites", skip_serializing_if = "Option::is_none")]
    pub proxied_sites: Option<ProxiedSitesConfig>,

    #[serde(rename = "trustedcas")]
    pub trusted_cas: Vec<TrustedCa>,
}

impl Configuration {
    /// PEM-encoded certificates of every trusted CA, in list order.
    pub fn trusted_ca_certs(&self) -> Vec<String> {
        self.trusted_cas.iter().map(|ca| ca.cert.clone()).collect()
    }

    /// Whether this process runs as a client (downstream of the proxies).
    pub fn is_downstream(&self) -> bool {
        self.role == Some(Role::Client)
    }

    pub fn is_upstream(&self) -> bool {
        !self.is_downstream()
    }

    /// Number of chained servers, zero when there is no client section.
    pub fn chained_server_count(&self) -> usize {
        self.client
            .as_ref()
            .map(|c| c.chained_servers.len())
            .unwrap_or(0)
    }
}

/// A certificate authority trusted for fronted and cloud config connections.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TrustedCa {
    #[serde(rename = "commonname")]
    pub common_name: String,

    /// PEM-encoded certificate.
    pub cert: String,
}

/// Client-side configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(rename = "dumpheaders")]
    pub dump_headers: bool,

    /// Minimum quality of service a server needs to be eligible.
    #[serde(rename = "minqos")]
    pub min_qos: i32,

    #[serde(rename = "proxyall")]
    pub proxy_all: bool,

    #[serde(rename = "frontedservers")]
    pub fronted_servers: Vec<FrontedServerInfo>,

    /// Chained servers keyed by identifier.
    #[serde(rename = "chainedservers")]
    pub chained_servers: BTreeMap<String, ChainedServerInfo>,

    /// Named sets of front domains usable for domain fronting.
    #[serde(rename = "masqueradesets")]
    pub masquerade_sets: BTreeMap<String, Vec<Masquerade>>,
}

impl ClientConfig {
    /// Sort servers so that they are always in a predictable order.
    pub fn sort_servers(&mut self) {
        self.fronted_servers
            .sort_by(|a, b| a.host.cmp(&b.host).then(a.port.cmp(&b.port)));
    }
}

/// A domain-fronted server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FrontedServerInfo {
    pub host: String,
    pub port: u16,

    #[serde(rename = "poolsize")]
    pub pool_size: u32,

    /// Name of the masquerade set used to reach this server.
    #[serde(rename = "masqueradeset")]
    pub masquerade_set: String,

    #[serde(rename = "maxmasquerades")]
    pub max_masquerades: u32,

    #[serde(rename = "insecureskipverify")]
    pub insecure_skip_verify: bool,

    #[serde(rename = "dialtimeoutmillis")]
    pub dial_timeout_millis: u64,

    #[serde(rename = "redialattempts")]
    pub redial_attempts: u32,

    pub weight: u32,

    pub qos: i32,

    pub trusted: bool,
}

/// A chained (non-fronted) proxy whose address and credentials are known.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ChainedServerInfo {
    /// `host:port` of the proxy.
    pub addr: String,

    /// PEM certificate presented by the proxy when it speaks TLS.
    pub cert: String,

    #[serde(rename = "authtoken")]
    pub auth_token: String,

    pub pipelined: bool,

    pub weight: u32,

    pub qos: i32,

    pub trusted: bool,
}

/// A front domain and the IP address to reach it at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Masquerade {
    pub domain: String,

    #[serde(rename = "ipaddress")]
    pub ip_address: String,
}

impl Masquerade {
    pub fn new(domain: &str, ip_address: &str) -> Self {
        Self {
            domain: domain.to_string(),
            ip_address: ip_address.to_string(),
        }
    }
}

/// Server-side configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(rename = "advertisedhost")]
    pub advertised_host: String,

    #[serde(rename = "waddelladdr")]
    pub waddell_addr: String,

    #[serde(rename = "registerat")]
    pub register_at: String,

    #[serde(rename = "certfile")]
    pub cert_file: String,

    #[serde(rename = "keyfile")]
    pub key_file: String,
}

/// Stats reporting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StatsConfig {
    #[serde(rename = "statshubaddr")]
    pub statshub_addr: String,

    #[serde(rename = "reportingperiodsecs")]
    pub reporting_period_secs: u64,
}

/// Proxied-sites policy: local user edits plus the cloud-provided list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxiedSitesConfig {
    pub delta: Option<ProxiedSitesDelta>,

    /// Canonical (sorted, deduplicated) list from the cloud.
    pub cloud: Vec<String>,
}

/// User-local additions to and deletions from the cloud list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxiedSitesDelta {
    pub additions: Vec<String>,
    pub deletions: Vec<String>,
}
