//! Direct domain-fronted fetching.
//!
//! A request for `http(s)://real.host/path` is sent to a masquerade's front
//! domain, resolved to the masquerade's IP, with the `Host` header naming
//! the real host. Masquerades are tried in order until one answers.

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, HOST};
use reqwest::{Certificate, Client};
use std::net::{IpAddr, SocketAddr};
use url::Url;

use crate::cloud::fetch::FetchError;
use crate::config::schema::Masquerade;
use crate::net::dialer::TLS_HANDSHAKE_TIMEOUT;

/// Fetches a URL without any chained proxy.
#[async_trait]
pub trait DirectFetcher: Send + Sync {
    async fn response(&self, url: &str) -> Result<reqwest::Response, FetchError>;
}

/// [`DirectFetcher`] that fronts requests through a masquerade set.
#[derive(Debug, Clone)]
pub struct MasqueradeFetcher {
    client: Client,
    masquerades: Vec<Masquerade>,
}

impl MasqueradeFetcher {
    /// Build a fetcher trusting only `trusted_cas` (PEM) for TLS fronts.
    ///
    /// Certificates that fail to parse and masquerades with an unparseable
    /// IP are skipped with a warning.
    pub fn new(trusted_cas: &[String], masquerades: Vec<Masquerade>) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .no_proxy()
            .pool_max_idle_per_host(0)
            .connect_timeout(TLS_HANDSHAKE_TIMEOUT)
            .tls_built_in_root_certs(false);

        for pem in trusted_cas {
            match Certificate::from_pem(pem.as_bytes()) {
                Ok(cert) => builder = builder.add_root_certificate(cert),
                Err(e) => tracing::warn!(error = %e, "Skipping unparseable trusted CA"),
            }
        }

        let mut usable = Vec::with_capacity(masquerades.len());
        for masquerade in masquerades {
            match masquerade.ip_address.parse::<IpAddr>() {
                Ok(ip) => {
                    // Port 0 keeps whatever port the request URL names.
                    builder = builder.resolve(&masquerade.domain, SocketAddr::new(ip, 0));
                    usable.push(masquerade);
                }
                Err(_) => tracing::warn!(
                    domain = %masquerade.domain,
                    ip = %masquerade.ip_address,
                    "Skipping masquerade with invalid IP"
                ),
            }
        }
        if usable.is_empty() {
            return Err(FetchError::Fronted("no usable masquerades".into()));
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Fronted(e.to_string()))?;
        Ok(Self {
            client,
            masquerades: usable,
        })
    }
}

#[async_trait]
impl DirectFetcher for MasqueradeFetcher {
    async fn response(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let target = Url::parse(url).map_err(|e| FetchError::Fronted(e.to_string()))?;
        let host = target
            .host_str()
            .ok_or_else(|| FetchError::Fronted(format!("{} has no host", url)))?;
        let host_header = match target.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        for masquerade in &self.masquerades {
            let mut fronted = target.clone();
            if fronted.set_host(Some(masquerade.domain.as_str())).is_err() {
                continue;
            }

            let result = self
                .client
                .get(fronted)
                .header(HOST, &host_header)
                .header(CACHE_CONTROL, "no-cache")
                .send()
                .await;
            match result {
                Ok(response) => {
                    tracing::debug!(domain = %masquerade.domain, "Fronted request answered");
                    return Ok(response);
                }
                Err(e) => {
                    tracing::debug!(domain = %masquerade.domain, error = %e, "Masquerade failed");
                }
            }
        }

        Err(FetchError::Fronted(format!(
            "all {} masquerades failed for {}",
            self.masquerades.len(),
            url
        )))
    }
}
