//! Conditional fetch of the gzipped cloud configuration.
//!
//! # Wire contract
//! ```text
//! GET <url>
//!   X-Lantern-If-None-Match: <cached etag>   (when known)
//!   X-LANTERN-AUTH-TOKEN: <token>            (when non-empty)
//!   Cache-Control: no-cache
//!   Connection: close
//!
//! 304            → unchanged, cache untouched
//! 200            → gunzip body, cache X-Lantern-Etag for <url>
//! anything else  → error, cache untouched
//! ```

use flate2::read::GzDecoder;
use reqwest::header::{CACHE_CONTROL, CONNECTION};
use reqwest::StatusCode;
use std::io::Read;
use thiserror::Error;

use crate::cloud::etag::EtagCache;
use crate::observability::metrics;

/// Response header carrying the document's validation token.
pub const ETAG_HEADER: &str = "X-Lantern-Etag";
/// Request header carrying the cached validation token.
pub const IF_NONE_MATCH_HEADER: &str = "X-Lantern-If-None-Match";
/// Request header authenticating against a chained server.
pub const AUTH_TOKEN_HEADER: &str = "X-LANTERN-AUTH-TOKEN";

/// Errors from a single fetch attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Unable to construct request for cloud config at {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unable to fetch cloud config at {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected response status: {0}")]
    Status(u16),

    #[error("Unable to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("Unable to open gzip reader: {0}")]
    Gzip(#[source] std::io::Error),

    #[error("Direct domain fronter unavailable: {0}")]
    Fronted(String),
}

/// Performs conditional GETs, remembering ETags in a shared [`EtagCache`].
#[derive(Clone, Debug, Default)]
pub struct ConfigFetcher {
    etags: EtagCache,
}

impl ConfigFetcher {
    pub fn new(etags: EtagCache) -> Self {
        Self { etags }
    }

    pub fn etags(&self) -> &EtagCache {
        &self.etags
    }

    /// Fetch `url` through `client`.
    ///
    /// Returns `Ok(None)` when the server reports the document unchanged.
    pub async fn fetch(
        &self,
        client: &reqwest::Client,
        url: &str,
        auth_token: &str,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        tracing::debug!(url = %url, "Checking for cloud configuration");

        // no-cache keeps intermediate CDNs from serving stale copies, and
        // closing the connection avoids EOFs on successive requests.
        let mut builder = client
            .get(url)
            .header(CACHE_CONTROL, "no-cache")
            .header(CONNECTION, "close");
        if let Some(etag) = self.etags.get(url) {
            builder = builder.header(IF_NONE_MATCH_HEADER, etag);
        }
        if !auth_token.is_empty() {
            builder = builder.header(AUTH_TOKEN_HEADER, auth_token);
        }

        let request = builder.build().map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;

        let response = match client.execute(request).await {
            Ok(response) => response,
            Err(source) => {
                metrics::record_fetch("error");
                return Err(FetchError::Transport {
                    url: url.to_string(),
                    source,
                });
            }
        };

        self.read_config_response(url, response).await
    }

    /// Interpret a cloud config response obtained by any transport.
    pub async fn read_config_response(
        &self,
        url: &str,
        response: reqwest::Response,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        match response.status() {
            StatusCode::NOT_MODIFIED => {
                tracing::debug!(url = %url, "Config unchanged in cloud");
                metrics::record_fetch("unchanged");
                return Ok(None);
            }
            StatusCode::OK => {}
            other => {
                metrics::record_fetch("error");
                return Err(FetchError::Status(other.as_u16()));
            }
        }

        let etag = response
            .headers()
            .get(ETAG_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let compressed = response.bytes().await.map_err(|e| {
            metrics::record_fetch("error");
            FetchError::Body(e)
        })?;
        let body = gunzip(&compressed).inspect_err(|_| metrics::record_fetch("error"))?;

        self.etags.insert(url, &etag);
        metrics::record_fetch("updated");
        tracing::debug!(url = %url, bytes = body.len(), "Fetched cloud config");
        Ok(Some(body))
    }
}

/// The cloud source always gzips configuration payloads.
fn gunzip(data: &[u8]) -> Result<Vec<u8>, FetchError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(FetchError::Gzip)?;
    Ok(out)
}
