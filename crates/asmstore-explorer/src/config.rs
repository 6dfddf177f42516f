use std::path::Path;

use asmstore_format::Retention;
use serde::{Deserialize, Serialize};

use crate::error::{ExplorerError, ExplorerResult};

/// Explorer settings, loadable from TOML.
///
/// ```toml
/// retention = "in-memory"
/// validate_architectures = true
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// What each store keeps of its bytes after decoding.
    pub retention: Retention,
    /// Compare stores that share an id across architectures.
    pub validate_architectures: bool,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            retention: Retention::Discard,
            validate_architectures: true,
        }
    }
}

impl ExplorerConfig {
    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    pub fn from_toml_str(text: &str) -> ExplorerResult<Self> {
        toml::from_str(text).map_err(|e| ExplorerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> ExplorerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
