//! Transports routed through chained proxies.

use reqwest::{Certificate, Client, Proxy};
use std::time::Duration;
use thiserror::Error;

use crate::config::schema::ChainedServerInfo;

/// Upper bound on establishing a connection, TLS handshake included.
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// A chained-server descriptor that cannot be turned into a transport.
#[derive(Debug, Error)]
pub enum DialError {
    #[error("chained server has no address")]
    MissingAddr,

    #[error("invalid certificate for chained server {addr}: {source}")]
    Certificate {
        addr: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unable to build transport via {addr}: {source}")]
    Build {
        addr: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Builds an HTTP transport that tunnels through one chained server.
pub trait DialerFactory: Send + Sync {
    fn transport(&self, server: &ChainedServerInfo) -> Result<Client, DialError>;
}

/// Treats each chained server as an HTTP(S) forward proxy.
///
/// Servers that carry a certificate are spoken to over TLS with that
/// certificate as an additional trust root. Keep-alive is disabled: every
/// bootstrap request gets its own connection.
#[derive(Debug, Clone, Default)]
pub struct ProxyDialer;

impl DialerFactory for ProxyDialer {
    fn transport(&self, server: &ChainedServerInfo) -> Result<Client, DialError> {
        if server.addr.is_empty() {
            return Err(DialError::MissingAddr);
        }
        let build_err = |source| DialError::Build {
            addr: server.addr.clone(),
            source,
        };

        let scheme = if server.cert.is_empty() { "http" } else { "https" };
        let proxy = Proxy::all(format!("{}://{}", scheme, server.addr)).map_err(build_err)?;

        let mut builder = Client::builder()
            .proxy(proxy)
            .pool_max_idle_per_host(0)
            .connect_timeout(TLS_HANDSHAKE_TIMEOUT);

        if !server.cert.is_empty() {
            let cert = Certificate::from_pem(server.cert.as_bytes()).map_err(|source| {
                DialError::Certificate {
                    addr: server.addr.clone(),
                    source,
                }
            })?;
            builder = builder.add_root_certificate(cert);
        }

        builder.build().map_err(build_err)
    }
}

/// Client for steady-state polling through the local proxy at `addr`.
pub fn local_proxy_client(addr: &str) -> Result<Client, DialError> {
    if addr.is_empty() {
        return Err(DialError::MissingAddr);
    }
    let build_err = |source| DialError::Build {
        addr: addr.to_string(),
        source,
    };
    let proxy = Proxy::all(format!("http://{}", addr)).map_err(build_err)?;
    Client::builder().proxy(proxy).build().map_err(build_err)
}
