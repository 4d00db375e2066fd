//! Steady-state cloud config polling.
//!
//! One call to [`CloudPoller::poll`] per tick of the owning manager. The
//! poller never touches the live configuration: a changed document comes
//! back as a [`Mutation`] that merges against whatever configuration is
//! live when the manager applies it.

use std::time::Duration;

use crate::cloud::fetch::{ConfigFetcher, FetchError};
use crate::config::merge::{merge, MergeError};
use crate::config::schema::Configuration;
use crate::resilience::backoff::jittered_interval;

/// Base interval between cloud config polls.
pub const CLOUD_CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// A deferred change to the live configuration.
pub type Mutation = Box<dyn FnOnce(&Configuration) -> Result<Configuration, MergeError> + Send>;

/// Result of a single poll.
pub struct PollOutcome {
    /// How long to wait before the next tick; independent of the fetch result.
    pub next_wait: Duration,
    /// `Ok(None)` when there is nothing to apply.
    pub result: Result<Option<Mutation>, FetchError>,
}

impl std::fmt::Debug for PollOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match &self.result {
            Ok(Some(_)) => "mutation".to_string(),
            Ok(None) => "unchanged".to_string(),
            Err(e) => format!("error: {}", e),
        };
        f.debug_struct("PollOutcome")
            .field("next_wait", &self.next_wait)
            .field("result", &result)
            .finish()
    }
}

/// Polls the cloud config URL through an egress client.
#[derive(Debug, Clone)]
pub struct CloudPoller {
    fetcher: ConfigFetcher,
    base_interval: Duration,
}

impl CloudPoller {
    pub fn new(fetcher: ConfigFetcher) -> Self {
        Self::with_interval(fetcher, CLOUD_CONFIG_POLL_INTERVAL)
    }

    pub fn with_interval(fetcher: ConfigFetcher, base_interval: Duration) -> Self {
        Self {
            fetcher,
            base_interval,
        }
    }

    /// Jittered wait in `[base/2, base*3/2)`.
    pub fn next_wait(&self) -> Duration {
        jittered_interval(self.base_interval)
    }

    /// Poll once against the `current` snapshot.
    ///
    /// No auth token is sent: `egress` points at the local proxy, which adds
    /// credentials for whichever upstream it ends up using.
    pub async fn poll(&self, current: &Configuration, egress: &reqwest::Client) -> PollOutcome {
        let next_wait = self.next_wait();

        if current.cloud_config.is_empty() {
            return PollOutcome {
                next_wait,
                result: Ok(None),
            };
        }
        let url = current.cloud_config.as_str();

        let result = match self.fetcher.fetch(egress, url, "").await {
            Ok(Some(bytes)) => {
                let mutation: Mutation = Box::new(move |live: &Configuration| {
                    tracing::debug!("Merging cloud configuration");
                    merge(&bytes, live)
                });
                Ok(Some(mutation))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Could not fetch cloud config");
                Err(e)
            }
        };

        PollOutcome { next_wait, result }
    }
}
