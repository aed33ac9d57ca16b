use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a run. Nothing is written when one is returned.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("failed to open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to lock {path}: {source}")]
    Lock { path: PathBuf, source: io::Error },

    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("invalid batch file {path}: {source}")]
    Batch {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid record marker '{0}': expected an identifier")]
    InvalidMarker(String),

    #[error("failed to build record pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("strict mode: {} unresolved issue(s); first: {}", .0.len(), first_issue(.0))]
    Strict(Vec<Issue>),
}

fn first_issue(issues: &[Issue]) -> String {
    issues.first().map(ToString::to_string).unwrap_or_default()
}

/// Per-record problems. Reported, never fatal unless strict mode is on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Issue {
    #[error("no record with identifier '{identifier}'")]
    MissingIdentifier { identifier: String },

    #[error("identifier '{identifier}' appears {count} times; only the first was patched")]
    DuplicateIdentifier { identifier: String, count: usize },

    #[error("record '{identifier}' is malformed and was not repaired: {reason}")]
    Malformed { identifier: String, reason: String },

    #[error("record '{identifier}' no longer parses once normalized; left unchanged")]
    Unnormalized { identifier: String },
}

pub type Result<T> = std::result::Result<T, PatchError>;
