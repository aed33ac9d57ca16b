//! Read-only consistency check of one or more documents.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::config::Config;
use crate::document::Document;
use crate::error::{PatchError, Result};
use crate::normalize;
use crate::repair::Repairer;

/// One invariant violation or defect found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    DuplicateIdentifier { identifier: String, count: usize },
    /// Ordinals of a category are not exactly `1..=N`.
    OrdinalSequence { category: String, ordinals: Vec<u32> },
    Corruption { identifier: String },
    Unnormalized { character: char, count: u64 },
    /// A marker whose first argument was readable but whose shape was not.
    MalformedRecord { identifier: String, reason: String },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::DuplicateIdentifier { identifier, count } => {
                write!(f, "identifier '{identifier}' appears {count} times")
            }
            Finding::OrdinalSequence { category, ordinals } => {
                write!(f, "category '{category}' has ordinals {ordinals:?}, expected 1..={}", ordinals.len())
            }
            Finding::Corruption { identifier } => {
                write!(f, "record '{identifier}' has a duplicated closing fragment")
            }
            Finding::Unnormalized { character, count } => {
                write!(f, "{count} occurrence(s) of {character:?} (U+{:04X})", *character as u32)
            }
            Finding::MalformedRecord { identifier, reason } => {
                write!(f, "record '{identifier}' does not parse: {reason}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub path: PathBuf,
    pub records: usize,
    pub findings: Vec<Finding>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Check a document's text against the record invariants.
pub fn scan_text(text: &str, repairer: &Repairer, config: &Config) -> Vec<Finding> {
    let document = Document::parse(text, &config.marker);
    let mut findings = Vec::new();

    for (identifier, count) in document.duplicate_identifiers() {
        findings.push(Finding::DuplicateIdentifier { identifier, count });
    }

    let mut by_category: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
    for record in document.records() {
        by_category
            .entry(record.category.as_str())
            .or_default()
            .push(record.ordinal);
    }
    for (category, mut ordinals) in by_category {
        ordinals.sort_unstable();
        let contiguous = ordinals
            .iter()
            .enumerate()
            .all(|(i, n)| usize::try_from(*n).is_ok_and(|n| n == i + 1));
        if !contiguous {
            findings.push(Finding::OrdinalSequence {
                category: category.to_string(),
                ordinals,
            });
        }
    }

    for corruption in repairer.detect(text) {
        findings.push(Finding::Corruption {
            identifier: corruption.identifier,
        });
    }

    for issue in document.parse_issues() {
        if let Some(identifier) = &issue.identifier {
            findings.push(Finding::MalformedRecord {
                identifier: identifier.clone(),
                reason: issue.reason.clone(),
            });
        }
    }

    let scanned = if config.compose_unicode {
        normalize::compose(text)
    } else {
        text.to_string()
    };
    for (character, count) in normalize::scan_unmapped(&scanned) {
        findings.push(Finding::Unnormalized { character, count });
    }

    findings
}

/// Scan several files in parallel. Files are only read.
pub fn scan_paths(paths: &[PathBuf], config: &Config) -> Result<Vec<ScanReport>> {
    let repairer = Repairer::new(&config.marker)?;
    paths
        .par_iter()
        .map(|path| scan_path(path, &repairer, config))
        .collect()
}

fn scan_path(path: &Path, repairer: &Repairer, config: &Config) -> Result<ScanReport> {
    let text = fs::read_to_string(path).map_err(|source| PatchError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let findings = scan_text(&text, repairer, config);
    let records = Document::parse(&text, &config.marker).len();
    Ok(ScanReport {
        path: path.to_path_buf(),
        records,
        findings,
    })
}

/// Totals by finding kind across reports, for the summary line.
pub fn tally(reports: &[ScanReport]) -> HashMap<&'static str, usize> {
    let mut totals = HashMap::new();
    for finding in reports.iter().flat_map(|r| &r.findings) {
        let kind = match finding {
            Finding::DuplicateIdentifier { .. } => "duplicate",
            Finding::OrdinalSequence { .. } => "ordinal",
            Finding::Corruption { .. } => "corruption",
            Finding::Unnormalized { .. } => "unnormalized",
            Finding::MalformedRecord { .. } => "malformed",
        };
        *totals.entry(kind).or_insert(0) += 1;
    }
    totals
}
