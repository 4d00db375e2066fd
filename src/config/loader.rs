//! Configuration loading from and saving to disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::config::merge::MergeError;
use crate::config::schema::Configuration;
use crate::config::validation::ValidationError;

/// Error type for configuration management.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Unable to create config dir at {path}: {source}")]
    ConfigDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No config directory available on this platform")]
    NoConfigDir,

    #[error("Unable to merge update: {0}")]
    Merge(#[from] MergeError),

    #[error("Unable to read bootstrap settings at {path}: {reason}")]
    BootstrapSettings { path: PathBuf, reason: String },

    #[error("Bootstrap did not complete within {0:?}")]
    BootstrapTimeout(Duration),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Load a configuration document from a YAML file.
///
/// No defaults or validation are applied; that is the manager's job.
pub fn load_config(path: &Path) -> Result<Configuration, ConfigError> {
    let content = fs::read(path).map_err(io_error(path))?;
    let config: Configuration = serde_yaml::from_slice(&content)?;
    Ok(config)
}

/// Save a configuration as YAML, replacing the file atomically.
pub fn save_config(path: &Path, config: &Configuration) -> Result<(), ConfigError> {
    let yaml = serde_yaml::to_string(config)?;
    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, yaml).map_err(io_error(&tmp))?;
    fs::rename(&tmp, path).map_err(io_error(path))?;
    tracing::debug!(path = %path.display(), version = config.version, "Saved configuration");
    Ok(())
}
