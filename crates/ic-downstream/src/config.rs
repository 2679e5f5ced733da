// config.rs — Downstream server launch configuration.
//
// The config file is a JSON map: serverName → {command, args, env?,
// sandbox?}. Relative `./src/...` and `node_modules/...` entries are
// resolved against the config file's directory before spawn; bare command
// names are resolved on PATH.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::DownstreamError;

/// How to launch one downstream server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerLaunchConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    /// Whether the server should be confined to the session sandbox via
    /// the roots protocol (default true).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<bool>,
}

/// The whole config file: serverName → launch config.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct DownstreamConfig {
    pub servers: BTreeMap<String, ServerLaunchConfig>,
}

impl DownstreamConfig {
    /// Load the config and resolve relative commands against the file's
    /// directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DownstreamError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| DownstreamError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: DownstreamConfig =
            serde_json::from_str(&raw).map_err(|source| DownstreamError::ConfigMalformed {
                path: path.to_path_buf(),
                source,
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for launch in config.servers.values_mut() {
            launch.command = resolve_launch_path(&launch.command, base);
            for arg in &mut launch.args {
                *arg = resolve_launch_path(arg, base);
            }
        }
        Ok(config)
    }
}

/// Resolve one command or argument string.
///
/// `./src/...` and `node_modules/...` become absolute against `base`; a
/// bare command name is looked up on PATH; anything else passes through.
pub(crate) fn resolve_launch_path(value: &str, base: &Path) -> String {
    if value.starts_with("./src/") || value.starts_with("node_modules/") {
        return base.join(value).to_string_lossy().into_owned();
    }
    if !value.contains('/') {
        if let Ok(found) = which::which(value) {
            return found.to_string_lossy().into_owned();
        }
    }
    value.to_string()
}
