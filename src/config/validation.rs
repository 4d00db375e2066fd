//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the invariants the defaults pass is expected to establish
//!   (role present, fronted-server tuning non-zero)
//! - Reject entries that cannot be dialed (empty hosts/addresses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Configuration → Result<(), Vec<ValidationError>>
//! - Runs after defaults, before a configuration is accepted by the manager

use thiserror::Error;
use url::Url;

use crate::config::schema::Configuration;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("role is not set")]
    MissingRole,

    #[error("cloud config URL {url:?} is invalid: {reason}")]
    InvalidCloudConfigUrl { url: String, reason: String },

    #[error("fronted server #{index} has an empty host")]
    EmptyFrontedHost { index: usize },

    #[error("fronted server {host} has zero {field}")]
    ZeroFrontedTuning { host: String, field: &'static str },

    #[error("chained server {key} has an empty address")]
    EmptyChainedAddr { key: String },

    #[error("trusted CA {name:?} has an empty certificate")]
    EmptyCaCert { name: String },
}

/// Validate a defaulted configuration.
pub fn validate_config(cfg: &Configuration) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if cfg.role.is_none() {
        errors.push(ValidationError::MissingRole);
    }

    if !cfg.cloud_config.is_empty() {
        if let Err(e) = Url::parse(&cfg.cloud_config) {
            errors.push(ValidationError::InvalidCloudConfigUrl {
                url: cfg.cloud_config.clone(),
                reason: e.to_string(),
            });
        }
    }

    if let Some(client) = cfg.client.as_ref().filter(|_| cfg.is_downstream()) {
        for (index, server) in client.fronted_servers.iter().enumerate() {
            if server.host.is_empty() {
                errors.push(ValidationError::EmptyFrontedHost { index });
            }
            let tuning = [
                ("qos", server.qos == 0),
                ("weight", server.weight == 0),
                ("redialattempts", server.redial_attempts == 0),
            ];
            for (field, is_zero) in tuning {
                if is_zero {
                    errors.push(ValidationError::ZeroFrontedTuning {
                        host: server.host.clone(),
                        field,
                    });
                }
            }
        }

        for (key, server) in &client.chained_servers {
            if server.addr.is_empty() {
                errors.push(ValidationError::EmptyChainedAddr { key: key.clone() });
            }
        }
    }

    for ca in &cfg.trusted_cas {
        if ca.cert.trim().is_empty() {
            errors.push(ValidationError::EmptyCaCert {
                name: ca.common_name.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
