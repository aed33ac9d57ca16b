//! Repair of records left with duplicated closing fragments.
//!
//! An earlier substitution that matched too much can leave text like
//! `Question("id", "cat", "text", 3), leftover", 3),`. The record head is
//! intact, so the repair keeps everything up to the first closing sequence
//! and drops the rest through the last one.
//!
//! A leftover fragment repeats the first closing's ordinal and holds no
//! `(`, `//` or bare `"`, so a later record, call or comment on the same
//! line is never mistaken for one.
//!
//! This works on raw text: a corrupted record still parses as a record
//! followed by junk, so the structural parser cannot see the defect.

use regex::{Captures, Regex};
use tracing::{info, warn};

use lazy_static::lazy_static;

use crate::error::{Issue, PatchError};
use crate::record::DEFAULT_MARKER;

lazy_static! {
    // `"` + `,` + ordinal + `)`, with an optional trailing comma.
    // Rust regex has no backreferences, so ordinals are compared in `detect`.
    static ref CLOSING: Regex = Regex::new(r#""\s*,\s*(\d+)\s*\)(,?)"#).unwrap();

    static ref DEFAULT_HEAD: Regex = head_pattern(DEFAULT_MARKER).unwrap();
}

fn head_pattern(marker: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r#"\b{}\(\s*"((?:[^"\\\n]|\\.)*)"\s*,\s*"((?:[^"\\\n]|\\.)*)"\s*,\s*""#,
        regex::escape(marker)
    ))
}

/// Result of a repair pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Identifiers of records that were collapsed.
    pub repaired: Vec<String>,
    /// Corrupted records that could not be decomposed.
    pub issues: Vec<Issue>,
}

/// One corrupted record found in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corruption {
    pub identifier: String,
    /// Byte range of the corrupted span, head through last closing fragment.
    pub span: std::ops::Range<usize>,
    /// Replacement text, or the reason the record cannot be repaired.
    pub fix: Result<String, String>,
}

/// Locates and collapses corrupted records for one marker.
pub struct Repairer {
    marker: String,
    /// `Marker(`
    opener: String,
    head: Regex,
}

impl Repairer {
    pub fn new(marker: &str) -> Result<Self, PatchError> {
        let head = if marker == DEFAULT_MARKER {
            DEFAULT_HEAD.clone()
        } else {
            head_pattern(marker)?
        };
        Ok(Self {
            marker: marker.to_string(),
            opener: format!("{marker}("),
            head,
        })
    }

    /// All corrupted records in `text`, in document order.
    pub fn detect(&self, text: &str) -> Vec<Corruption> {
        let heads: Vec<Captures> = self.head.captures_iter(text).collect();
        let mut found = Vec::new();

        for (i, caps) in heads.iter().enumerate() {
            let (Some(whole), Some(id), Some(category)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                continue;
            };
            let content_start = whole.end();
            // A raw content literal is never the corruption shape.
            if text[content_start..].starts_with("\"\"") {
                continue;
            }

            let next_head = heads
                .get(i + 1)
                .and_then(|c| c.get(0))
                .map_or(text.len(), |m| m.start());
            // Any later `Marker(`, boundary or not, ends the record.
            let next_marker = text[content_start..]
                .find(&self.opener)
                .map_or(text.len(), |n| content_start + n);
            let line_end = text[content_start..]
                .find('\n')
                .map_or(text.len(), |n| content_start + n);
            let region = &text[content_start..next_head.min(next_marker).min(line_end)];

            let closings: Vec<Captures> = CLOSING
                .captures_iter(region)
                .filter(|c| c.get(0).is_some_and(|m| !is_escaped(region, m.start())))
                .collect();
            let Some(first) = closings.first() else {
                continue;
            };
            let ordinal = first.get(1).map_or("", |m| m.as_str());

            let mut last = first;
            let mut fragments = 0;
            for next in &closings[1..] {
                let (Some(prev), Some(current)) = (last.get(0), next.get(0)) else {
                    break;
                };
                let same_ordinal = next.get(1).is_some_and(|m| m.as_str() == ordinal);
                if !same_ordinal || !is_leftover(&region[prev.end()..current.start()]) {
                    break;
                }
                last = next;
                fragments += 1;
            }
            if fragments == 0 {
                continue;
            }

            let (Some(first_match), Some(last_match)) = (first.get(0), last.get(0)) else {
                continue;
            };

            let content = &region[..first_match.start()];
            let trailing_comma = last.get(2).map_or("", |m| m.as_str());

            let fix = if has_unescaped_quote(content) {
                Err("content contains an unescaped quote".to_string())
            } else {
                match ordinal.parse::<u32>() {
                    Ok(n) => Ok(format!(
                        "{}(\"{}\", \"{}\", \"{}\", {}){}",
                        self.marker,
                        id.as_str(),
                        category.as_str(),
                        content,
                        n,
                        trailing_comma
                    )),
                    Err(_) => Err(format!("ordinal {ordinal} is out of range")),
                }
            };

            found.push(Corruption {
                identifier: id.as_str().to_string(),
                span: whole.start()..content_start + last_match.end(),
                fix,
            });
        }

        found
    }

    /// Collapse every repairable corruption; report the rest.
    pub fn repair(&self, text: &str) -> (String, RepairReport) {
        let mut report = RepairReport::default();
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;

        for corruption in self.detect(text) {
            match corruption.fix {
                Ok(replacement) => {
                    info!(identifier = %corruption.identifier, "collapsing duplicated closing fragment");
                    out.push_str(&text[cursor..corruption.span.start]);
                    out.push_str(&replacement);
                    cursor = corruption.span.end;
                    report.repaired.push(corruption.identifier);
                }
                Err(reason) => {
                    warn!(identifier = %corruption.identifier, %reason, "corrupted record skipped");
                    report.issues.push(Issue::Malformed {
                        identifier: corruption.identifier,
                        reason,
                    });
                }
            }
        }

        out.push_str(&text[cursor..]);
        (out, report)
    }
}

/// Repair `text` for the given marker.
pub fn repair_corruption(text: &str, marker: &str) -> Result<(String, RepairReport), PatchError> {
    Ok(Repairer::new(marker)?.repair(text))
}

/// Whether the byte at `pos` is preceded by an odd run of backslashes.
fn is_escaped(text: &str, pos: usize) -> bool {
    let backslashes = text.as_bytes()[..pos]
        .iter()
        .rev()
        .take_while(|b| **b == b'\\')
        .count();
    backslashes % 2 == 1
}

/// Text between two closings that can only be a duplicated content tail.
fn is_leftover(gap: &str) -> bool {
    !gap.contains('(') && !gap.contains("//") && !has_unescaped_quote(gap)
}

fn has_unescaped_quote(content: &str) -> bool {
    content
        .char_indices()
        .any(|(i, c)| c == '"' && !is_escaped(content, i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn repair(text: &str) -> (String, RepairReport) {
        repair_corruption(text, DEFAULT_MARKER).unwrap()
    }

    #[test]
    fn collapses_duplicated_fragment() {
        let text = r#"    Question("q_3", "q", "Is X done?", 3), extra garbage", 3),
"#;
        let (out, report) = repair(text);
        assert_eq!(out, "    Question(\"q_3\", \"q\", \"Is X done?\", 3),\n");
        assert_eq!(report.repaired, vec!["q_3".to_string()]);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn drops_every_extra_fragment() {
        let text = r#"Question("q_1", "q", "Kept", 1), junk", 1), more junk", 1),"#;
        let (out, _) = repair(text);
        assert_eq!(out, r#"Question("q_1", "q", "Kept", 1),"#);
    }

    #[test]
    fn differing_ordinal_is_not_a_duplicate() {
        let text = r#"Question("q_1", "q", "Kept", 1), junk", 9),"#;
        let (out, report) = repair(text);
        assert_eq!(out, text);
        assert_eq!(report, RepairReport::default());
    }

    #[test]
    fn stops_at_trailing_comment() {
        let text = "    Question(\"a_1\", \"a\", \"Fine\", 1), // was \"Old\", 1)\n";
        let (out, report) = repair(text);
        assert_eq!(out, text);
        assert_eq!(report, RepairReport::default());
    }

    #[test]
    fn stops_at_marker_inside_longer_name() {
        let text = concat!(
            "Question(\"a_1\", \"a\", \"One\", 1), CustomQuestion(\"c_1\", \"c\", \"Keep me\", 1),\n",
            "Question(\"b_1\", \"b\", \"Two\", 1),\n",
        );
        let (out, report) = repair(text);
        assert_eq!(out, text);
        assert!(report.repaired.is_empty());
    }

    #[test]
    fn call_between_closings_is_kept() {
        let text = r#"Question("a_1", "a", "One", 1), wrap("x", 1),"#;
        let (out, _) = repair(text);
        assert_eq!(out, text);
    }

    #[test]
    fn healthy_records_are_untouched() {
        let text = "Question(\"a_1\", \"a\", \"One\", 1), Question(\"a_2\", \"a\", \"Two\", 2),\nQuestion(\"a_3\", \"a\", \"Three\", 3)\n";
        let (out, report) = repair(text);
        assert_eq!(out, text);
        assert_eq!(report, RepairReport::default());
    }

    #[test]
    fn escaped_quote_is_not_a_closing_sequence() {
        let text = r#"Question("e_1", "e", "He wrote \", 2) here", 5),"#;
        let (out, report) = repair(text);
        assert_eq!(out, text);
        assert!(report.repaired.is_empty());
    }

    #[test]
    fn repairs_each_corrupted_record_independently() {
        let text = concat!(
            "Question(\"c_1\", \"c\", \"A\", 1), x\", 1),\n",
            "Question(\"c_2\", \"c\", \"B\", 2),\n",
            "Question(\"c_3\", \"c\", \"C\", 3), y\", 3), z\", 3),\n",
        );
        let (out, report) = repair(text);
        assert_eq!(
            out,
            "Question(\"c_1\", \"c\", \"A\", 1),\nQuestion(\"c_2\", \"c\", \"B\", 2),\nQuestion(\"c_3\", \"c\", \"C\", 3),\n"
        );
        assert_eq!(report.repaired, vec!["c_1".to_string(), "c_3".to_string()]);
    }

    #[test]
    fn out_of_range_ordinal_is_reported_not_repaired() {
        let text = r#"Question("big_1", "big", "Huge", 99999999999), junk", 99999999999),"#;
        let (out, report) = repair(text);
        assert_eq!(out, text);
        assert_eq!(
            report.issues,
            vec![Issue::Malformed {
                identifier: "big_1".to_string(),
                reason: "ordinal 99999999999 is out of range".to_string(),
            }]
        );
    }

    #[test]
    fn stray_quote_in_content_is_reported() {
        let text = r#"Question("m_1", "m", "He said "hi" twice", 1), twice", 1),"#;
        let (out, report) = repair(text);
        assert_eq!(out, text);
        assert_eq!(report.issues.len(), 1);
        assert!(matches!(&report.issues[0], Issue::Malformed { identifier, .. } if identifier == "m_1"));
    }

    #[test]
    fn repaired_output_is_stable() {
        let text = r#"Question("s_1", "s", "Stable?", 1), again", 1),"#;
        let (once, _) = repair(text);
        let (twice, report) = repair(&once);
        assert_eq!(once, twice);
        assert!(report.repaired.is_empty());
    }

    #[test]
    fn custom_marker_is_supported() {
        let repairer = Repairer::new("Item").unwrap();
        let (out, report) = repairer.repair(r#"Item("i_1", "i", "Text", 2), dup", 2),"#);
        assert_eq!(out, r#"Item("i_1", "i", "Text", 2),"#);
        assert_eq!(report.repaired.len(), 1);
    }
}
