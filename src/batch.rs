//! Batch files: one batch as a JSON array, or several passes.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PatchError, Result};
use crate::record::PatchEntry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchFile {
    Single(Vec<PatchEntry>),
    Passes { passes: Vec<Vec<PatchEntry>> },
}

impl BatchFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| PatchError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| PatchError::Batch {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Each pass gets its own 1-based ordinal sequence.
    pub fn passes(&self) -> Vec<&[PatchEntry]> {
        match self {
            BatchFile::Single(entries) => vec![entries.as_slice()],
            BatchFile::Passes { passes } => passes.iter().map(Vec::as_slice).collect(),
        }
    }

    pub fn entry_count(&self) -> usize {
        self.passes().iter().map(|p| p.len()).sum()
    }
}
