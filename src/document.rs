//! In-memory document: opaque text interleaved with parsed records.
//!
//! Records are looked up through an identifier index, replaced as typed
//! values and written back with the canonical serializer. Records a
//! transform does not touch keep their original bytes.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info, warn};

use crate::error::Issue;
use crate::normalize;
use crate::parse::{self, ParseIssue, RecordSlot, Segment};
use crate::record::{LiteralStyle, PatchEntry, Record, encode_literal, raw_representable};

/// What happened to one batch entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStatus {
    Replaced,
    Unchanged,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub identifier: String,
    pub ordinal: u32,
    pub status: PatchStatus,
}

impl fmt::Display for PatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            PatchStatus::Replaced => write!(f, "replaced {} (#{})", self.identifier, self.ordinal),
            PatchStatus::Unchanged => write!(f, "unchanged {}", self.identifier),
            PatchStatus::Missing => write!(f, "missing {}", self.identifier),
        }
    }
}

/// Result of applying one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<PatchOutcome>,
    pub issues: Vec<Issue>,
}

impl BatchReport {
    pub fn count(&self, status: PatchStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn replaced(&self) -> impl Iterator<Item = &PatchOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == PatchStatus::Replaced)
    }
}

/// Result of normalizing a parsed document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub substitutions: u64,
    /// Identifiers of records whose text changed.
    pub records: Vec<String>,
    /// Records left as they were because the normalized text did not parse.
    pub issues: Vec<Issue>,
}

#[derive(Debug, Clone)]
pub struct Document {
    marker: String,
    segments: Vec<Segment>,
    /// Identifier → indices of record segments, in document order.
    index: HashMap<String, Vec<usize>>,
    parse_issues: Vec<ParseIssue>,
}

impl Document {
    pub fn parse(text: &str, marker: &str) -> Self {
        let (segments, parse_issues) = parse::parse_segments(text, marker);
        for issue in &parse_issues {
            debug!(
                offset = issue.offset,
                identifier = issue.identifier.as_deref().unwrap_or(""),
                "skipping {marker}( that is not a record: {}",
                issue.reason
            );
        }

        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, segment) in segments.iter().enumerate() {
            if let Segment::Record(slot) = segment {
                index
                    .entry(slot.record.identifier.clone())
                    .or_default()
                    .push(i);
            }
        }

        Self {
            marker: marker.to_string(),
            segments,
            index,
            parse_issues,
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Record(slot) => Some(&slot.record),
            Segment::Text(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.records().count()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// First record carrying `identifier`.
    pub fn get(&self, identifier: &str) -> Option<&Record> {
        let position = *self.index.get(identifier)?.first()?;
        match &self.segments[position] {
            Segment::Record(slot) => Some(&slot.record),
            Segment::Text(_) => None,
        }
    }

    pub fn parse_issues(&self) -> &[ParseIssue] {
        &self.parse_issues
    }

    /// Identifiers that occur more than once, with their counts.
    pub fn duplicate_identifiers(&self) -> Vec<(String, usize)> {
        let mut duplicates: Vec<(String, usize)> = self
            .index
            .iter()
            .filter(|(_, positions)| positions.len() > 1)
            .map(|(id, positions)| (id.clone(), positions.len()))
            .collect();
        duplicates.sort();
        duplicates
    }

    /// Apply `entries` in order; entry `i` receives ordinal `i + 1`.
    ///
    /// Each entry is independent: a missing identifier is reported and the
    /// remaining entries still apply.
    pub fn apply_patch_batch(&mut self, entries: &[PatchEntry]) -> BatchReport {
        let mut report = BatchReport::default();
        for (i, entry) in entries.iter().enumerate() {
            let ordinal = u32::try_from(i + 1).unwrap_or(u32::MAX);
            let (outcome, issue) = self.apply_patch(entry.clone().into_record(ordinal));
            report.outcomes.push(outcome);
            report.issues.extend(issue);
        }
        report
    }

    /// Replace the first record whose identifier matches `record`'s.
    pub fn apply_patch(&mut self, record: Record) -> (PatchOutcome, Option<Issue>) {
        let identifier = record.identifier.clone();
        let ordinal = record.ordinal;
        let outcome = |status: PatchStatus| PatchOutcome {
            identifier: identifier.clone(),
            ordinal,
            status,
        };

        let Some(positions) = self.index.get(&record.identifier) else {
            warn!(identifier = %identifier, "no record with this identifier; entry skipped");
            let issue = Issue::MissingIdentifier {
                identifier: identifier.clone(),
            };
            return (outcome(PatchStatus::Missing), Some(issue));
        };

        let issue = if positions.len() > 1 {
            warn!(
                identifier = %identifier,
                count = positions.len(),
                "identifier is not unique; patching the first occurrence"
            );
            Some(Issue::DuplicateIdentifier {
                identifier: identifier.clone(),
                count: positions.len(),
            })
        } else {
            None
        };

        let position = positions[0];
        let Segment::Record(slot) = &mut self.segments[position] else {
            return (outcome(PatchStatus::Missing), issue);
        };

        if slot.record == record {
            return (outcome(PatchStatus::Unchanged), issue);
        }

        info!(identifier = %identifier, ordinal, "replacing record");
        *slot = RecordSlot::canonical(record, &self.marker);
        (outcome(PatchStatus::Replaced), issue)
    }

    /// Normalize punctuation everywhere, keeping literal boundaries intact.
    pub fn normalize(&mut self, compose: bool) -> NormalizeReport {
        let mut report = NormalizeReport::default();
        for segment in &mut self.segments {
            match segment {
                Segment::Text(text) => {
                    let prepared = prepare(text, compose);
                    let (normalized, subs) = normalize::normalize_counted(&prepared);
                    report.substitutions += subs;
                    *text = normalized;
                }
                Segment::Record(slot) => {
                    let (source, subs) = normalize_record_source(slot, compose);
                    if source == slot.source {
                        continue;
                    }
                    match parse::parse_record(&source, &self.marker) {
                        Some(updated) => {
                            report.substitutions += subs;
                            report.records.push(updated.record.identifier.clone());
                            *slot = updated;
                        }
                        None => {
                            warn!(
                                identifier = %slot.record.identifier,
                                "normalized record no longer parses; left unchanged"
                            );
                            report.issues.push(Issue::Unnormalized {
                                identifier: slot.record.identifier.clone(),
                            });
                        }
                    }
                }
            }
        }
        report
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Record(slot) => out.push_str(&slot.source),
            }
        }
        out
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

fn prepare(text: &str, compose: bool) -> String {
    if compose {
        normalize::compose(text)
    } else {
        text.to_string()
    }
}

/// Rebuild a record's source with every literal normalized in place.
fn normalize_record_source(slot: &RecordSlot, compose: bool) -> (String, u64) {
    let source = &slot.source;
    let mut out = String::with_capacity(source.len());
    let mut subs = 0;
    let mut cursor = 0;

    for span in &slot.literals {
        let (between, n) = normalize::normalize_counted(&source[cursor..span.range.start]);
        out.push_str(&between);
        subs += n;

        let literal = &source[span.range.clone()];
        match span.style {
            LiteralStyle::Escaped => {
                let body = prepare(&literal[1..literal.len() - 1], compose);
                let (body, n) = normalize::normalize_escaped_literal(&body);
                out.push('"');
                out.push_str(&body);
                out.push('"');
                subs += n;
            }
            LiteralStyle::Raw => {
                let body = prepare(&literal[3..literal.len() - 3], compose);
                let (body, n) = normalize::normalize_counted(&body);
                let style = if raw_representable(&body) {
                    LiteralStyle::Raw
                } else {
                    LiteralStyle::Escaped
                };
                out.push_str(&encode_literal(&body, style));
                subs += n;
            }
        }
        cursor = span.range.end;
    }

    let (tail, n) = normalize::normalize_counted(&source[cursor..]);
    out.push_str(&tail);
    subs += n;
    (out, subs)
}

#[cfg(test)]
impl Document {
    /// Append `record` with a hand-written source. The source must keep the
    /// canonical literal positions.
    pub(crate) fn push_unchecked_record(&mut self, record: Record, source: &str) {
        let mut slot = RecordSlot::canonical(record, &self.marker);
        slot.source = source.to_string();
        self.index
            .entry(slot.record.identifier.clone())
            .or_default()
            .push(self.segments.len());
        self.segments.push(Segment::Record(slot));
    }
}

/// Parse `text`, apply one batch and serialize again.
pub fn apply_patch_batch(text: &str, entries: &[PatchEntry], marker: &str) -> (String, BatchReport) {
    let mut document = Document::parse(text, marker);
    let report = document.apply_patch_batch(entries);
    (document.to_text(), report)
}
