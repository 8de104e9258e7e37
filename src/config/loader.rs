//! Configuration discovery and loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::ConfigDocument;

/// Project-local config file name, also used in the home directory.
pub const CONFIG_FILE_NAME: &str = ".vproxy.conf";

/// System-wide config locations, probed after the home directory.
pub const SYSTEM_CONFIG_PATHS: [&str; 2] = ["/usr/local/etc/vproxy.conf", "/usr/etc/vproxy.conf"];

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Which command is resolving its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMode {
    Client,
    Daemon,
}

/// Candidate config paths for a command, highest priority first.
///
/// The daemon usually runs from an arbitrary working directory (or as a
/// service), so it does not look for a project-local file.
pub fn candidate_paths(mode: CommandMode) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(4);
    if mode == CommandMode::Client {
        candidates.push(PathBuf::from(CONFIG_FILE_NAME));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(CONFIG_FILE_NAME));
    }
    candidates.extend(SYSTEM_CONFIG_PATHS.iter().map(PathBuf::from));
    candidates
}

/// Locate the config file to use.
///
/// An explicit path must exist; it is never silently replaced by another
/// candidate. Without one, the well-known candidates are probed and `None`
/// is returned when nothing is found.
pub fn find_config_file(
    explicit: Option<&Path>,
    mode: CommandMode,
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    Ok(find_config(&candidate_paths(mode)))
}

/// Return the first existing candidate, also trying the `.toml` spelling of
/// any `.conf` candidate.
pub fn find_config(candidates: &[PathBuf]) -> Option<PathBuf> {
    for candidate in candidates {
        if candidate.as_os_str().is_empty() {
            continue;
        }
        if candidate.exists() {
            return Some(candidate.clone());
        }
        if let Some(alt) = toml_variant(candidate) {
            if alt.exists() {
                return Some(alt);
            }
        }
    }
    None
}

fn toml_variant(path: &Path) -> Option<PathBuf> {
    let raw = path.to_str()?;
    if !raw.contains(".conf") {
        return None;
    }
    Some(PathBuf::from(raw.replacen(".conf", ".toml", 1)))
}

/// Load a config document. The format is TOML whatever the extension.
pub fn load_config(path: &Path) -> Result<ConfigDocument, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
