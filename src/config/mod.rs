//! Configuration for the bridging subsystem
//!
//! Configuration resolves in three layers: built-in defaults, an optional
//! YAML file, and environment-variable overrides (strongest).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the plugin manifest path
pub const MANIFEST_PATH_ENV: &str = "XSLT_PLUGINS_CONFIG";

/// Environment variable overriding the code-bundle directory
pub const BUNDLE_DIR_ENV: &str = "XSLT_PLUGINS_BUNDLE_DIR";

/// Default plugin manifest location, relative to the working directory
pub const DEFAULT_MANIFEST_PATH: &str = "plugins/plugins.xml";

/// Configuration file name looked up in the working directory and in the
/// platform config directory
pub const CONFIG_FILE_NAME: &str = "xslt-bridge.yaml";

/// Bridging subsystem configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Plugin manifest path
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,

    /// Directory scanned for code bundles; overrides the manifest's own
    /// `bundleDir` setting when set
    #[serde(default)]
    pub bundle_dir: Option<PathBuf>,
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from(DEFAULT_MANIFEST_PATH)
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            manifest_path: default_manifest_path(),
            bundle_dir: None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Resolve configuration: config file if one is found, then environment
    /// overrides on top
    pub fn resolve() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment-variable overrides in place
    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = non_blank_env(MANIFEST_PATH_ENV) {
            self.manifest_path = PathBuf::from(path);
        }
        if let Some(dir) = non_blank_env(BUNDLE_DIR_ENV) {
            self.bundle_dir = Some(PathBuf::from(dir));
        }
    }

    fn find_config_file() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("xslt-bridge").join(CONFIG_FILE_NAME))
            .filter(|path| path.is_file())
    }
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
