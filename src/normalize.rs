//! Punctuation normalizer.
//!
//! Maps typographic quotes, dashes, arrows, comparison/operator symbols and
//! the ellipsis to plain ASCII so that free text can be embedded in a quoted
//! record field. No target sequence contains a source character, so one
//! application is a fixed point.

use std::collections::{BTreeMap, HashMap};

use lazy_static::lazy_static;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref PUNCTUATION_TABLE: Vec<(char, &'static str)> = {
        vec![
            // Double quotation marks
            ('\u{201C}', "\""), // “
            ('\u{201D}', "\""), // ”
            ('\u{201E}', "\""), // „
            ('\u{201F}', "\""), // ‟
            ('\u{00AB}', "\""), // «
            ('\u{00BB}', "\""), // »

            // Single quotation marks
            ('\u{2018}', "'"), // ‘
            ('\u{2019}', "'"), // ’
            ('\u{201A}', "'"), // ‚
            ('\u{201B}', "'"), // ‛
            ('\u{2039}', "'"), // ‹
            ('\u{203A}', "'"), // ›

            // Dashes
            ('\u{2014}', "-"), // em dash
            ('\u{2013}', "-"), // en dash
            ('\u{2012}', "-"), // figure dash
            ('\u{2015}', "-"), // horizontal bar
            ('\u{2212}', "-"), // minus sign

            // Arrows
            ('\u{2192}', "->"),
            ('\u{2190}', "<-"),
            ('\u{2194}', "<->"),

            // Comparison
            ('\u{2264}', "<="),
            ('\u{2265}', ">="),
            ('\u{2260}', "!="),
            ('\u{2248}', "~="),

            // Operators
            ('\u{00D7}', "x"),
            ('\u{00F7}', "/"),
            ('\u{00B1}', "+/-"),

            // Units and punctuation
            ('\u{00B0}', " degrees"),
            ('\u{2026}', "..."),
        ]
    };

    static ref PUNCTUATION_LOOKUP: HashMap<char, &'static str> =
        PUNCTUATION_TABLE.iter().cloned().collect();
}

/// The fixed source → target table, in declaration order.
pub fn mapping_table() -> &'static [(char, &'static str)] {
    PUNCTUATION_TABLE.as_slice()
}

/// Replacement for a single character, if it is mapped.
pub fn replacement_for(c: char) -> Option<&'static str> {
    PUNCTUATION_LOOKUP.get(&c).copied()
}

/// Normalize text, discarding the substitution count.
pub fn normalize(text: &str) -> String {
    normalize_counted(text).0
}

/// Normalize text and report how many characters were substituted.
pub fn normalize_counted(text: &str) -> (String, u64) {
    map_chars(text, false)
}

/// Normalize the decoded body of an escaped string literal.
///
/// Identical to [`normalize_counted`] except that a target containing `"`
/// is written as `\"` and a bare `$` in front of a letter target becomes
/// `\$`, so the result can be spliced back between the literal's delimiters.
pub(crate) fn normalize_escaped_literal(body: &str) -> (String, u64) {
    map_chars(body, true)
}

/// Canonical composition (NFC). Runs before the table when enabled.
pub fn compose(text: &str) -> String {
    text.nfc().collect()
}

/// Count the mapped source characters still present in `text`.
pub fn scan_unmapped(text: &str) -> BTreeMap<char, u64> {
    let mut counts = BTreeMap::new();
    for c in text.chars() {
        if PUNCTUATION_LOOKUP.contains_key(&c) {
            *counts.entry(c).or_insert(0) += 1;
        }
    }
    counts
}

fn map_chars(text: &str, escaped_literal: bool) -> (String, u64) {
    let mut out = String::with_capacity(text.len());
    let mut subs: u64 = 0;
    // Inside an escaped literal: the next char follows a backslash, and
    // whether the last char emitted was a bare `$`.
    let mut after_backslash = false;
    let mut bare_dollar = false;

    for c in text.chars() {
        match PUNCTUATION_LOOKUP.get(&c) {
            Some(target) => {
                subs += 1;
                if escaped_literal {
                    // `$` followed by a letter would become a string template.
                    if bare_dollar && target.starts_with(|t: char| t.is_alphabetic() || t == '_') {
                        out.pop();
                        out.push_str("\\$");
                    }
                    out.push_str(&target.replace('"', "\\\""));
                } else {
                    out.push_str(target);
                }
                after_backslash = false;
                bare_dollar = false;
            }
            None => {
                out.push(c);
                bare_dollar = c == '$' && !after_backslash;
                after_backslash = c == '\\' && !after_backslash;
            }
        }
    }

    (out, subs)
}
