//! Run configuration, optionally loaded from a TOML file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PatchError, Result};
use crate::record::DEFAULT_MARKER;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Record constructor name.
    pub marker: String,
    /// Treat missing identifiers and unrepairable records as failures.
    pub strict: bool,
    /// Normalize the document and batch content before patching.
    pub normalize_before_patch: bool,
    /// Apply Unicode NFC before the punctuation table.
    pub compose_unicode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            strict: false,
            normalize_before_patch: true,
            compose_unicode: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| PatchError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| PatchError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// The marker must be a plain identifier.
    pub fn validate(&self) -> Result<()> {
        let mut chars = self.marker.chars();
        let valid = chars
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
            && chars.all(|c| c.is_alphanumeric() || c == '_');
        if valid {
            Ok(())
        } else {
            Err(PatchError::InvalidMarker(self.marker.clone()))
        }
    }
}
