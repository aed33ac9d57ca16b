//! Record values and their canonical text form.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default record constructor name.
pub const DEFAULT_MARKER: &str = "Question";

/// One `Marker("identifier", "category", "content", ordinal)` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub identifier: String,
    pub category: String,
    pub content: String,
    pub ordinal: u32,
}

impl Record {
    pub fn new(
        identifier: impl Into<String>,
        category: impl Into<String>,
        content: impl Into<String>,
        ordinal: u32,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            category: category.into(),
            content: content.into(),
            ordinal,
        }
    }

    /// Canonical serialization under the given marker.
    ///
    /// Identifier and category are always escaped literals; the content
    /// uses a raw literal when it holds a `"` that a raw literal can carry.
    pub fn to_source(&self, marker: &str) -> String {
        format!(
            "{marker}({}, {}, {}, {})",
            encode_literal(&self.identifier, LiteralStyle::Escaped),
            encode_literal(&self.category, LiteralStyle::Escaped),
            encode_literal(&self.content, LiteralStyle::for_content(&self.content)),
            self.ordinal
        )
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_source(DEFAULT_MARKER))
    }
}

/// One replacement in a batch. The ordinal comes from the entry's position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchEntry {
    pub identifier: String,
    pub category: String,
    pub content: String,
}

impl PatchEntry {
    pub fn new(
        identifier: impl Into<String>,
        category: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            category: category.into(),
            content: content.into(),
        }
    }

    pub fn into_record(self, ordinal: u32) -> Record {
        Record {
            identifier: self.identifier,
            category: self.category,
            content: self.content,
            ordinal,
        }
    }
}

/// How a string field is quoted in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralStyle {
    /// `"..."` with backslash escapes.
    Escaped,
    /// `"""..."""`, no escapes.
    Raw,
}

impl LiteralStyle {
    /// Raw when the value has a quote and raw quoting can hold it verbatim.
    pub fn for_content(value: &str) -> Self {
        if value.contains('"') && raw_representable(value) {
            LiteralStyle::Raw
        } else {
            LiteralStyle::Escaped
        }
    }
}

/// A raw literal cannot contain `"""`, control characters or a `$` that
/// would open a string template.
pub fn raw_representable(value: &str) -> bool {
    if value.contains("\"\"\"") || value.chars().any(char::is_control) {
        return false;
    }
    !opens_template(value)
}

fn opens_template(value: &str) -> bool {
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' {
            if let Some(&next) = chars.peek() {
                if next == '{' || next == '_' || next.is_alphabetic() {
                    return true;
                }
            }
        }
    }
    false
}

/// Quote `value` in the requested style.
pub fn encode_literal(value: &str, style: LiteralStyle) -> String {
    match style {
        LiteralStyle::Raw => format!("\"\"\"{value}\"\"\""),
        LiteralStyle::Escaped => {
            let mut out = String::with_capacity(value.len() + 2);
            out.push('"');
            out.push_str(&escape_body(value));
            out.push('"');
            out
        }
    }
}

/// Escape the body of an escaped literal (no surrounding quotes).
pub fn escape_body(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' => {
                let opens = matches!(chars.peek(), Some(&n) if n == '{' || n == '_' || n.is_alphabetic());
                if opens {
                    out.push_str("\\$");
                } else {
                    out.push('$');
                }
            }
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}
