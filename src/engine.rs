//! Load → transform → save over one document.

use std::fmt;
use std::path::Path;

use tracing::info;

use crate::batch::BatchFile;
use crate::config::Config;
use crate::document::{Document, PatchStatus};
use crate::error::{Issue, PatchError, Result};
use crate::normalize;
use crate::record::PatchEntry;
use crate::repair::Repairer;
use crate::store::LockedDocument;

/// The operation a run is bound to.
#[derive(Debug, Clone)]
pub enum Transform {
    Normalize,
    Repair,
    Patch(BatchFile),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Normalized,
    Repaired,
    Replaced { ordinal: u32 },
}

/// One record changed by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub identifier: String,
    pub action: Action,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action {
            Action::Normalized => write!(f, "Normalized {}", self.identifier),
            Action::Repaired => write!(f, "Repaired {}", self.identifier),
            Action::Replaced { ordinal } => write!(f, "Updated {} (#{ordinal})", self.identifier),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub changes: Vec<Change>,
    pub unchanged: usize,
    pub substitutions: u64,
    pub issues: Vec<Issue>,
    /// Whether the document text differs from what was loaded.
    pub modified: bool,
    pub written: bool,
}

impl RunSummary {
    /// Entries that were skipped: missing identifiers and unrepairable records.
    pub fn skipped(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| !matches!(i, Issue::DuplicateIdentifier { .. }))
            .count()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} changed, {} unchanged, {} skipped",
            self.changes.len(),
            self.unchanged,
            self.skipped()
        )?;
        if self.substitutions > 0 {
            write!(f, ", {} character(s) normalized", self.substitutions)?;
        }
        Ok(())
    }
}

pub struct Engine {
    config: Config,
    repairer: Repairer,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let repairer = Repairer::new(&config.marker)?;
        Ok(Self { config, repairer })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `transform` over `text`. Never touches storage.
    pub fn run_text(&self, text: &str, transform: &Transform) -> (String, RunSummary) {
        let mut summary = RunSummary::default();
        let output = match transform {
            Transform::Normalize => {
                let mut document = Document::parse(text, &self.config.marker);
                self.normalize_document(&mut document, &mut summary);
                document.to_text()
            }
            Transform::Repair => self.repair_text(text, &mut summary),
            Transform::Patch(batch) => {
                let repaired = self.repair_text(text, &mut summary);
                let mut document = Document::parse(&repaired, &self.config.marker);
                if self.config.normalize_before_patch {
                    self.normalize_document(&mut document, &mut summary);
                }
                for pass in batch.passes() {
                    self.apply_pass(&mut document, pass, &mut summary);
                }
                document.to_text()
            }
        };
        summary.modified = output != text;
        (output, summary)
    }

    /// Lock, load, transform and write `path` once.
    ///
    /// In strict mode any reported issue fails the run before the write.
    pub fn run_file(&self, path: &Path, transform: &Transform, dry_run: bool) -> Result<RunSummary> {
        let document = LockedDocument::open(path)?;
        let text = document.read()?;
        let (output, mut summary) = self.run_text(&text, transform);

        if self.config.strict && !summary.issues.is_empty() {
            return Err(PatchError::Strict(summary.issues));
        }

        if summary.modified && !dry_run {
            document.write(&output)?;
            summary.written = true;
            info!(path = %document.path().display(), changes = summary.changes.len(), "document written");
        }
        Ok(summary)
    }

    fn repair_text(&self, text: &str, summary: &mut RunSummary) -> String {
        let (output, report) = self.repairer.repair(text);
        summary.changes.extend(report.repaired.into_iter().map(|identifier| Change {
            identifier,
            action: Action::Repaired,
        }));
        summary.issues.extend(report.issues);
        output
    }

    fn normalize_document(&self, document: &mut Document, summary: &mut RunSummary) {
        let report = document.normalize(self.config.compose_unicode);
        summary.substitutions += report.substitutions;
        summary.issues.extend(report.issues);
        summary.changes.extend(report.records.into_iter().map(|identifier| Change {
            identifier,
            action: Action::Normalized,
        }));
    }

    fn apply_pass(&self, document: &mut Document, pass: &[PatchEntry], summary: &mut RunSummary) {
        let prepared: Vec<PatchEntry> = if self.config.normalize_before_patch {
            pass.iter().map(|entry| self.normalize_entry(entry)).collect()
        } else {
            pass.to_vec()
        };

        let report = document.apply_patch_batch(&prepared);
        summary.unchanged += report.count(PatchStatus::Unchanged);
        summary.changes.extend(report.replaced().map(|outcome| Change {
            identifier: outcome.identifier.clone(),
            action: Action::Replaced {
                ordinal: outcome.ordinal,
            },
        }));
        summary.issues.extend(report.issues);
    }

    fn normalize_entry(&self, entry: &PatchEntry) -> PatchEntry {
        let content = if self.config.compose_unicode {
            normalize::compose(&entry.content)
        } else {
            entry.content.clone()
        };
        PatchEntry {
            content: normalize::normalize(&content),
            ..entry.clone()
        }
    }
}
