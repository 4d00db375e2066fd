//! Config directory resolution and salvage of older config files.
//!
//! Config files are named `lantern-<version>.yaml`. When no file exists for
//! the running version, the first older `lantern*.yaml` in the directory
//! that looks customized (1 to 9 chained servers; the stock config ships
//! with none or with many) is renamed into place.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::loader::{load_config, ConfigError};

const MIN_CUSTOM_CHAINED: usize = 1;
const MAX_CUSTOM_CHAINED: usize = 9;

/// File name of the config for an application version.
pub fn config_file_name(version: &str) -> String {
    format!("lantern-{}.yaml", version)
}

/// Resolve the config directory and the path of `filename` inside it,
/// creating the directory if needed.
///
/// `override_dir` wins over the platform config directory (`<config>/Lantern`).
pub fn in_config_dir(
    override_dir: Option<&Path>,
    filename: &str,
) -> Result<(PathBuf, PathBuf), ConfigError> {
    let dir = match override_dir {
        Some(dir) => dir.to_path_buf(),
        None => dirs::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join("Lantern"),
    };
    tracing::debug!(dir = %dir.display(), "Using config dir");

    if !dir.exists() {
        create_dir(&dir).map_err(|source| ConfigError::ConfigDir {
            path: dir.clone(),
            source,
        })?;
    }

    let path = dir.join(filename);
    Ok((dir, path))
}

#[cfg(unix)]
fn create_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o750).create(dir)
}

#[cfg(not(unix))]
fn create_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

/// Whether the file at `path` is a `lantern*.yaml` config with a custom
/// chained server list.
pub fn has_custom_chained_server(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };
    if !(name.starts_with("lantern") && name.ends_with(".yaml")) {
        tracing::debug!(name, "File name does not match");
        return false;
    }

    let cfg = match load_config(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Could not read config");
            return false;
        }
    };

    let count = cfg.chained_server_count();
    tracing::debug!(count, "Found chained servers");
    (MIN_CUSTOM_CHAINED..=MAX_CUSTOM_CHAINED).contains(&count)
}

fn is_good_config(path: &Path) -> bool {
    path.is_file() && has_custom_chained_server(path)
}

/// One-time salvage of an older customized config into `config_path`.
///
/// Returns the path that was moved into place, if any.
pub fn copy_good_old_config(config_dir: &Path, config_path: &Path) -> Option<PathBuf> {
    if is_good_config(config_path) {
        tracing::debug!("Using existing config");
        return None;
    }

    let entries = match fs::read_dir(config_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(dir = %config_dir.display(), error = %e, "Could not read config dir");
            return None;
        }
    };

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path != config_path)
        .collect();
    candidates.sort();

    for path in candidates {
        if !is_good_config(&path) {
            continue;
        }
        match fs::rename(&path, config_path) {
            Ok(()) => {
                tracing::info!(from = %path.display(), to = %config_path.display(), "Copied old config");
                return Some(path);
            }
            Err(e) => {
                tracing::error!(
                    from = %path.display(),
                    to = %config_path.display(),
                    error = %e,
                    "Could not rename old config"
                );
            }
        }
    }
    None
}
