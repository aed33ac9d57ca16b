//! Record-level patch engine for generated source files.
//!
//! A document is plain text holding `Question("id", "category", "content", n)`
//! entries. The engine normalizes punctuation, collapses records corrupted by
//! earlier imprecise substitutions, and replaces records by identifier while
//! leaving every other byte in place.

pub mod batch;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod parse;
pub mod record;
pub mod repair;
pub mod scan;
pub mod store;

pub use batch::BatchFile;
pub use config::Config;
pub use document::{BatchReport, Document, PatchOutcome, PatchStatus, apply_patch_batch};
pub use engine::{Engine, RunSummary, Transform};
pub use error::{Issue, PatchError};
pub use normalize::{normalize, normalize_counted};
pub use record::{PatchEntry, Record};
pub use repair::{RepairReport, repair_corruption};

// =============================================================================
// Python bindings
// =============================================================================

#[cfg(feature = "python")]
mod python {
    use std::path::Path;

    use pyo3::exceptions::{PyIOError, PyValueError};
    use pyo3::prelude::*;

    use crate::{BatchFile, Config, Engine, PatchEntry, PatchError, Transform};

    fn to_py_err(err: PatchError) -> PyErr {
        match err {
            PatchError::Open { .. }
            | PatchError::Lock { .. }
            | PatchError::Read { .. }
            | PatchError::Write { .. } => PyIOError::new_err(err.to_string()),
            other => PyValueError::new_err(other.to_string()),
        }
    }

    fn engine(marker: Option<String>, strict: bool) -> PyResult<Engine> {
        let mut config = Config {
            strict,
            ..Config::default()
        };
        if let Some(marker) = marker {
            config.marker = marker;
        }
        Engine::new(config).map_err(to_py_err)
    }

    /// Normalize punctuation in text.
    /// Returns: (normalized_text, substitution_count)
    #[pyfunction]
    fn normalize_text(text: String) -> PyResult<(String, u64)> {
        Ok(crate::normalize::normalize_counted(&text))
    }

    /// Apply one batch of (identifier, category, content) triples to text.
    /// Returns: (new_text, changed_count, issue_messages)
    #[pyfunction]
    #[pyo3(signature = (text, entries, marker=None))]
    fn patch_text(
        text: String,
        entries: Vec<(String, String, String)>,
        marker: Option<String>,
    ) -> PyResult<(String, u64, Vec<String>)> {
        let entries = entries
            .into_iter()
            .map(|(id, category, content)| PatchEntry::new(id, category, content))
            .collect();
        let (output, summary) =
            engine(marker, false)?.run_text(&text, &Transform::Patch(BatchFile::Single(entries)));
        let issues = summary.issues.iter().map(ToString::to_string).collect();
        Ok((output, summary.changes.len() as u64, issues))
    }

    /// Collapse duplicated closing fragments.
    /// Returns: (new_text, repaired_identifiers, issue_messages)
    #[pyfunction]
    #[pyo3(signature = (text, marker=None))]
    fn repair_text(text: String, marker: Option<String>) -> PyResult<(String, Vec<String>, Vec<String>)> {
        let marker = marker.unwrap_or_else(|| crate::record::DEFAULT_MARKER.to_string());
        let (output, report) = crate::repair_corruption(&text, &marker).map_err(to_py_err)?;
        let issues = report.issues.iter().map(ToString::to_string).collect();
        Ok((output, report.repaired, issues))
    }

    /// Patch a file in place from a JSON batch file, entirely in Rust.
    /// Returns: (was_modified, changed_count)
    #[pyfunction]
    #[pyo3(signature = (document_path, batch_path, strict=false))]
    fn patch_file(document_path: String, batch_path: String, strict: bool) -> PyResult<(bool, u64)> {
        let batch = BatchFile::load(Path::new(&batch_path)).map_err(to_py_err)?;
        let summary = engine(None, strict)?
            .run_file(Path::new(&document_path), &Transform::Patch(batch), false)
            .map_err(to_py_err)?;
        Ok((summary.written, summary.changes.len() as u64))
    }

    #[pymodule]
    fn rust_record_patch(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(normalize_text, m)?)?;
        m.add_function(wrap_pyfunction!(patch_text, m)?)?;
        m.add_function(wrap_pyfunction!(repair_text, m)?)?;
        m.add_function(wrap_pyfunction!(patch_file, m)?)?;
        Ok(())
    }
}
