use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::schema::SidekickConfig;

/// Config file name, checked project-local then user-global.
const CONFIG_FILENAME: &str = "sidekick.toml";

/// Errors from loading a config file from an explicit path.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Load config from the given path.
pub fn load_from_path(path: &Path) -> Result<SidekickConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./sidekick.toml` (project-local)
/// 2. `~/.config/sidekick/sidekick.toml` (user-global)
///
/// Returns `SidekickConfig::default()` if no config file is found; a file
/// that fails to load is reported via `tracing` and also falls back to
/// defaults rather than aborting startup.
pub fn discover_and_load() -> SidekickConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_from_path(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    SidekickConfig::default()
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }

    if let Some(dirs) = directories::ProjectDirs::from("", "", "sidekick") {
        let p = dirs.config_dir().join(CONFIG_FILENAME);
        if p.exists() {
            return Some(p);
        }
    }

    None
}
