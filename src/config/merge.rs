//! Merging a fetched cloud document into the live configuration.
//!
//! The update is decoded into [`ConfigUpdate`], a mirror of the schema in
//! which every field is optional, so presence in the payload is explicit.
//! A new [`Configuration`] is then built from the base:
//!
//! - fields present in the update overwrite the base, absent ones are kept;
//! - fronted servers, chained servers, masquerade sets and trusted CAs are
//!   always replaced wholesale (absent means empty);
//! - the cloud proxied-sites list is deduplicated and sorted.
//!
//! The base is only borrowed, so a malformed payload can never leave a
//! partially-applied configuration behind.

use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::schema::{
    ChainedServerInfo, ClientConfig, Configuration, FrontedServerInfo, Masquerade,
    ProxiedSitesConfig, Role, ServerConfig, StatsConfig, TrustedCa,
};

/// Errors produced while merging an update.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The payload is not a well-formed configuration document.
    #[error("unable to parse YAML for update: {0}")]
    Malformed(#[from] serde_yaml::Error),
}

/// Merge `raw` onto `current`, returning the replacement configuration.
///
/// Defaults are not applied here; callers run the defaults pass afterwards.
pub fn merge(raw: &[u8], current: &Configuration) -> Result<Configuration, MergeError> {
    let update: ConfigUpdate = serde_yaml::from_slice(raw)?;

    let mut merged = current.clone();
    update.apply_to(&mut merged);
    canonicalize_cloud_sites(&mut merged);

    tracing::debug!(
        chained_servers = merged.chained_server_count(),
        trusted_cas = merged.trusted_cas.len(),
        "Merged cloud configuration"
    );
    Ok(merged)
}

fn canonicalize_cloud_sites(cfg: &mut Configuration) {
    if let Some(sites) = cfg.proxied_sites.as_mut() {
        if !sites.cloud.is_empty() {
            sites.cloud.sort();
            sites.cloud.dedup();
        }
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Presence-tracking view of a configuration payload.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub version: Option<u64>,
    #[serde(rename = "cloudconfig")]
    pub cloud_config: Option<String>,
    #[serde(rename = "cloudconfigca")]
    pub cloud_config_ca: Option<String>,
    pub addr: Option<String>,
    pub role: Option<Role>,
    #[serde(rename = "instanceid")]
    pub instance_id: Option<String>,
    #[serde(rename = "cpuprofile")]
    pub cpu_profile: Option<String>,
    #[serde(rename = "memprofile")]
    pub mem_profile: Option<String>,
    #[serde(rename = "uiaddr")]
    pub ui_addr: Option<String>,
    #[serde(rename = "autoreport")]
    pub auto_report: Option<bool>,
    #[serde(rename = "autolaunch")]
    pub auto_launch: Option<bool>,
    pub stats: Option<StatsUpdate>,
    pub server: Option<ServerUpdate>,
    pub client: Option<ClientUpdate>,
    #[serde(rename = "proxiedsites")]
    pub proxied_sites: Option<ProxiedSitesUpdate>,
    #[serde(rename = "trustedcas")]
    pub trusted_cas: Option<Vec<TrustedCa>>,
}

impl ConfigUpdate {
    fn apply_to(self, cfg: &mut Configuration) {
        set(&mut cfg.version, self.version);
        set(&mut cfg.cloud_config, self.cloud_config);
        set(&mut cfg.cloud_config_ca, self.cloud_config_ca);
        set(&mut cfg.addr, self.addr);
        if self.role.is_some() {
            cfg.role = self.role;
        }
        set(&mut cfg.instance_id, self.instance_id);
        set(&mut cfg.cpu_profile, self.cpu_profile);
        set(&mut cfg.mem_profile, self.mem_profile);
        set(&mut cfg.ui_addr, self.ui_addr);
        if self.auto_report.is_some() {
            cfg.auto_report = self.auto_report;
        }
        if self.auto_launch.is_some() {
            cfg.auto_launch = self.auto_launch;
        }

        if let Some(stats) = self.stats {
            stats.apply_to(cfg.stats.get_or_insert_with(StatsConfig::default));
        }
        if let Some(server) = self.server {
            server.apply_to(cfg.server.get_or_insert_with(ServerConfig::default));
        }

        // Replaced collections live under `client`; clear them even when
        // the update carries no client section at all.
        match self.client {
            Some(update) => update.apply_to(cfg.client.get_or_insert_with(ClientConfig::default)),
            None => {
                if let Some(client) = cfg.client.as_mut() {
                    client.fronted_servers = Vec::new();
                    client.chained_servers = BTreeMap::new();
                    client.masquerade_sets = BTreeMap::new();
                }
            }
        }

        if let Some(sites) = self.proxied_sites {
            sites.apply_to(
                cfg.proxied_sites
                    .get_or_insert_with(ProxiedSitesConfig::default),
            );
        }

        cfg.trusted_cas = self.trusted_cas.unwrap_or_default();
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClientUpdate {
    #[serde(rename = "dumpheaders")]
    pub dump_headers: Option<bool>,
    #[serde(rename = "minqos")]
    pub min_qos: Option<i32>,
    #[serde(rename = "proxyall")]
    pub proxy_all: Option<bool>,
    #[serde(rename = "frontedservers")]
    pub fronted_servers: Option<Vec<FrontedServerInfo>>,
    #[serde(rename = "chainedservers")]
    pub chained_servers: Option<BTreeMap<String, ChainedServerInfo>>,
    #[serde(rename = "masqueradesets")]
    pub masquerade_sets: Option<BTreeMap<String, Vec<Masquerade>>>,
}

impl ClientUpdate {
    fn apply_to(self, client: &mut ClientConfig) {
        set(&mut client.dump_headers, self.dump_headers);
        set(&mut client.min_qos, self.min_qos);
        set(&mut client.proxy_all, self.proxy_all);
        client.fronted_servers = self.fronted_servers.unwrap_or_default();
        client.chained_servers = self.chained_servers.unwrap_or_default();
        client.masquerade_sets = self.masquerade_sets.unwrap_or_default();
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StatsUpdate {
    #[serde(rename = "statshubaddr")]
    pub statshub_addr: Option<String>,
    #[serde(rename = "reportingperiodsecs")]
    pub reporting_period_secs: Option<u64>,
}

impl StatsUpdate {
    fn apply_to(self, stats: &mut StatsConfig) {
        set(&mut stats.statshub_addr, self.statshub_addr);
        set(&mut stats.reporting_period_secs, self.reporting_period_secs);
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerUpdate {
    #[serde(rename = "advertisedhost")]
    pub advertised_host: Option<String>,
    #[serde(rename = "waddelladdr")]
    pub waddell_addr: Option<String>,
    #[serde(rename = "registerat")]
    pub register_at: Option<String>,
    #[serde(rename = "certfile")]
    pub cert_file: Option<String>,
    #[serde(rename = "keyfile")]
    pub key_file: Option<String>,
}

impl ServerUpdate {
    fn apply_to(self, server: &mut ServerConfig) {
        set(&mut server.advertised_host, self.advertised_host);
        set(&mut server.waddell_addr, self.waddell_addr);
        set(&mut server.register_at, self.register_at);
        set(&mut server.cert_file, self.cert_file);
        set(&mut server.key_file, self.key_file);
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProxiedSitesUpdate {
    pub delta: Option<DeltaUpdate>,
    pub cloud: Option<Vec<String>>,
}

impl ProxiedSitesUpdate {
    fn apply_to(self, sites: &mut ProxiedSitesConfig) {
        if let Some(delta) = self.delta {
            let target = sites.delta.get_or_insert_with(Default::default);
            set(&mut target.additions, delta.additions);
            set(&mut target.deletions, delta.deletions);
        }
        set(&mut sites.cloud, self.cloud);
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeltaUpdate {
    pub additions: Option<Vec<String>>,
    pub deletions: Option<Vec<String>>,
}
