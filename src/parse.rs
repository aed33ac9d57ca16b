//! Tokenizer that splits document text into opaque text and typed records.
//!
//! A record is `Marker(<lit>, <lit>, <lit>, <uint>)` where `<lit>` is an
//! escaped (`"..."`) or raw (`"""..."""`) string literal. Anything else,
//! including a marker followed by a different argument shape, stays text.

use std::ops::Range;

use crate::record::{LiteralStyle, Record, encode_literal};

/// Position and quoting of one string literal inside a record's source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralSpan {
    /// Byte range of the whole literal, delimiters included.
    pub range: Range<usize>,
    pub style: LiteralStyle,
}

/// A parsed record together with the exact text it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSlot {
    pub record: Record,
    pub source: String,
    /// Identifier, category and content literals, in order.
    pub literals: [LiteralSpan; 3],
}

impl RecordSlot {
    /// Canonical slot for `record`, as the serializer writes it.
    pub fn canonical(record: Record, marker: &str) -> Self {
        let styles = [
            LiteralStyle::Escaped,
            LiteralStyle::Escaped,
            LiteralStyle::for_content(&record.content),
        ];
        let values = [&record.identifier, &record.category, &record.content];

        let mut source = format!("{marker}(");
        let mut spans = Vec::with_capacity(3);
        for (value, style) in values.iter().zip(styles) {
            if !spans.is_empty() {
                source.push_str(", ");
            }
            let start = source.len();
            source.push_str(&encode_literal(value, style));
            spans.push(LiteralSpan {
                range: start..source.len(),
                style,
            });
        }
        source.push_str(&format!(", {})", record.ordinal));

        let mut spans = spans.into_iter();
        let literals = [
            spans.next().unwrap_or_else(empty_span),
            spans.next().unwrap_or_else(empty_span),
            spans.next().unwrap_or_else(empty_span),
        ];
        Self {
            record,
            source,
            literals,
        }
    }
}

fn empty_span() -> LiteralSpan {
    LiteralSpan {
        range: 0..0,
        style: LiteralStyle::Escaped,
    }
}

/// One piece of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Record(RecordSlot),
}

/// A marker occurrence that did not decompose into the record shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIssue {
    /// Byte offset of the marker in the input.
    pub offset: usize,
    /// First literal, when it could be read.
    pub identifier: Option<String>,
    pub reason: String,
}

/// Split `text` into segments. Never fails; shapes that do not parse are
/// kept as text and described in the returned issues.
pub fn parse_segments(text: &str, marker: &str) -> (Vec<Segment>, Vec<ParseIssue>) {
    let mut segments = Vec::new();
    let mut issues = Vec::new();
    let mut text_start = 0;
    let mut search_from = 0;

    if marker.is_empty() {
        return (vec![Segment::Text(text.to_string())], issues);
    }

    while let Some(found) = text[search_from..].find(marker) {
        let start = search_from + found;
        let after_marker = start + marker.len();
        search_from = after_marker;

        if !at_identifier_boundary(text, start) || !text[after_marker..].starts_with('(') {
            continue;
        }

        match parse_record_at(text, start, marker) {
            Ok((slot, end)) => {
                if text_start < start {
                    segments.push(Segment::Text(text[text_start..start].to_string()));
                }
                segments.push(Segment::Record(slot));
                text_start = end;
                search_from = end;
            }
            Err(failure) => issues.push(ParseIssue {
                offset: start,
                identifier: failure.identifier,
                reason: failure.reason,
            }),
        }
    }

    if text_start < text.len() {
        segments.push(Segment::Text(text[text_start..].to_string()));
    }
    (segments, issues)
}

/// Parse a single record that must span all of `source`.
pub fn parse_record(source: &str, marker: &str) -> Option<RecordSlot> {
    match parse_record_at(source, 0, marker) {
        Ok((slot, end)) if end == source.len() => Some(slot),
        _ => None,
    }
}

fn at_identifier_boundary(text: &str, start: usize) -> bool {
    match text[..start].chars().next_back() {
        Some(c) => !(c.is_alphanumeric() || c == '_'),
        None => true,
    }
}

struct Failure {
    identifier: Option<String>,
    reason: String,
}

impl Failure {
    fn new(identifier: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            identifier,
            reason: reason.into(),
        }
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }

    fn eat(&mut self, c: char) -> bool {
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn literal(&mut self) -> Result<(String, Range<usize>, LiteralStyle), String> {
        let start = self.pos;
        if self.rest().starts_with("\"\"\"") {
            self.pos += 3;
            let value = self.raw_body()?;
            Ok((value, start..self.pos, LiteralStyle::Raw))
        } else if self.eat('"') {
            let value = self.escaped_body()?;
            Ok((value, start..self.pos, LiteralStyle::Escaped))
        } else {
            Err("expected a string literal".to_string())
        }
    }

    /// Body of a raw literal; the closing delimiter is the last three
    /// quotes of the first run of three or more.
    fn raw_body(&mut self) -> Result<String, String> {
        let rest = self.rest();
        let mut offset = 0;
        while let Some(found) = rest[offset..].find('"') {
            let run_start = offset + found;
            let run = rest[run_start..].bytes().take_while(|b| *b == b'"').count();
            if run >= 3 {
                let body_end = run_start + run - 3;
                let value = rest[..body_end].to_string();
                self.pos += run_start + run;
                return Ok(value);
            }
            offset = run_start + run;
        }
        Err("unterminated raw string literal".to_string())
    }

    fn escaped_body(&mut self) -> Result<String, String> {
        let mut value = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(value);
                }
                '\n' => return Err("line break inside string literal".to_string()),
                '\\' => {
                    let (_, escaped) = chars
                        .next()
                        .ok_or_else(|| "unterminated escape".to_string())?;
                    match escaped {
                        'n' => value.push('\n'),
                        'r' => value.push('\r'),
                        't' => value.push('\t'),
                        'b' => value.push('\u{0008}'),
                        '"' | '\'' | '\\' | '$' => value.push(escaped),
                        'u' => {
                            let hex: String = chars.by_ref().take(4).map(|(_, h)| h).collect();
                            let decoded = u32::from_str_radix(&hex, 16)
                                .ok()
                                .filter(|_| hex.len() == 4)
                                .and_then(char::from_u32)
                                .ok_or_else(|| format!("invalid unicode escape \\u{hex}"))?;
                            value.push(decoded);
                        }
                        other => return Err(format!("unsupported escape \\{other}")),
                    }
                }
                c => value.push(c),
            }
        }
        Err("unterminated string literal".to_string())
    }

    fn ordinal(&mut self) -> Result<u32, String> {
        let digits = self.rest().bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return Err("expected an ordinal".to_string());
        }
        let text = &self.rest()[..digits];
        let value = text
            .parse::<u32>()
            .map_err(|_| format!("ordinal {text} out of range"))?;
        self.pos += digits;
        Ok(value)
    }
}

fn parse_record_at(text: &str, start: usize, marker: &str) -> Result<(RecordSlot, usize), Failure> {
    let mut cursor = Cursor {
        src: text,
        pos: start + marker.len(),
    };
    if !cursor.eat('(') {
        return Err(Failure::new(None, "expected '('"));
    }

    let mut values: Vec<String> = Vec::with_capacity(3);
    let mut spans: Vec<LiteralSpan> = Vec::with_capacity(3);
    for field in 0..3 {
        cursor.skip_ws();
        let identifier = values.first().cloned();
        let (value, range, style) = cursor.literal().map_err(|r| Failure::new(identifier.clone(), r))?;
        values.push(value);
        spans.push(LiteralSpan {
            range: (range.start - start)..(range.end - start),
            style,
        });
        cursor.skip_ws();
        if !cursor.eat(',') {
            return Err(Failure::new(
                values.first().cloned(),
                format!("expected ',' after field {}", field + 1),
            ));
        }
    }

    cursor.skip_ws();
    let ordinal = cursor
        .ordinal()
        .map_err(|r| Failure::new(values.first().cloned(), r))?;
    cursor.skip_ws();
    if cursor.eat(',') {
        cursor.skip_ws();
    }
    if !cursor.eat(')') {
        return Err(Failure::new(values.first().cloned(), "expected ')'"));
    }

    let end = cursor.pos;
    let mut values = values.into_iter();
    let record = Record {
        identifier: values.next().unwrap_or_default(),
        category: values.next().unwrap_or_default(),
        content: values.next().unwrap_or_default(),
        ordinal,
    };
    let mut spans = spans.into_iter();
    let literals = [
        spans.next().unwrap_or_else(empty_span),
        spans.next().unwrap_or_else(empty_span),
        spans.next().unwrap_or_else(empty_span),
    ];
    let slot = RecordSlot {
        record,
        source: text[start..end].to_string(),
        literals,
    };
    Ok((slot, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DEFAULT_MARKER;
    use pretty_assertions::assert_eq;

    fn records(text: &str) -> Vec<Record> {
        parse_segments(text, DEFAULT_MARKER)
            .0
            .into_iter()
            .filter_map(|s| match s {
                Segment::Record(slot) => Some(slot.record),
                Segment::Text(_) => None,
            })
            .collect()
    }

    #[test]
    fn splits_text_and_records() {
        let text = "val qs = listOf(\n    Question(\"a_1\", \"a\", \"First?\", 1),\n    Question(\"a_2\", \"a\", \"Second?\", 2),\n)\n";
        let (segments, issues) = parse_segments(text, DEFAULT_MARKER);
        assert!(issues.is_empty());
        assert_eq!(segments.len(), 5);
        assert_eq!(
            records(text),
            vec![
                Record::new("a_1", "a", "First?", 1),
                Record::new("a_2", "a", "Second?", 2),
            ]
        );

        let rebuilt: String = segments
            .iter()
            .map(|s| match s {
                Segment::Text(t) => t.as_str(),
                Segment::Record(slot) => slot.source.as_str(),
            })
            .collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn decodes_escapes_and_raw_literals() {
        let text = r#"Question("q_1", "q", "Say \"hi\" for \$5!", 1) Question("q_2", "q", """Is "this" ok?""", 2)"#;
        assert_eq!(
            records(text),
            vec![
                Record::new("q_1", "q", "Say \"hi\" for $5!", 1),
                Record::new("q_2", "q", "Is \"this\" ok?", 2),
            ]
        );
    }

    #[test]
    fn raw_literal_may_end_with_quote() {
        let text = r#"Question("q_1", "q", """He said "yes"""", 7)"#;
        assert_eq!(records(text), vec![Record::new("q_1", "q", "He said \"yes\"", 7)]);
    }

    #[test]
    fn closing_marker_inside_content_is_not_a_boundary() {
        let text = r#"Question("q_1", "q", "Ends early?\", 3), not really", 3), Question("q_2", "q", "Next", 4),"#;
        assert_eq!(
            records(text),
            vec![
                Record::new("q_1", "q", "Ends early?\", 3), not really", 3),
                Record::new("q_2", "q", "Next", 4),
            ]
        );
    }

    #[test]
    fn marker_requires_identifier_boundary() {
        let text = r#"CustomQuestion("c_1", "c", "text", 1)"#;
        let (segments, issues) = parse_segments(text, DEFAULT_MARKER);
        assert_eq!(segments, vec![Segment::Text(text.to_string())]);
        assert!(issues.is_empty());
    }

    #[test]
    fn other_shapes_are_reported_and_kept() {
        let text = "data class Question(\n    val id: String = \"\",\n)\nQuestion(\"${sub}_1\", sub, \"Text\", 1)";
        let (segments, issues) = parse_segments(text, DEFAULT_MARKER);
        assert_eq!(segments, vec![Segment::Text(text.to_string())]);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].identifier, None);
        assert_eq!(issues[1].identifier.as_deref(), Some("${sub}_1"));
    }

    #[test]
    fn accepts_multiline_arguments_and_trailing_comma() {
        let text = "Question(\n  \"m_1\",\n  \"m\",\n  \"Spread out\",\n  1,\n)";
        assert_eq!(records(text), vec![Record::new("m_1", "m", "Spread out", 1)]);
    }

    #[test]
    fn canonical_slot_reparses_to_same_spans() {
        let record = Record::new("q_9", "q", "A \"quoted\" word", 9);
        let slot = RecordSlot::canonical(record.clone(), DEFAULT_MARKER);
        assert_eq!(parse_record(&slot.source, DEFAULT_MARKER), Some(slot.clone()));
        assert_eq!(slot.record, record);
    }
}
