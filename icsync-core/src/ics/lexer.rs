//! Content line lexer (RFC 5545 §3.1).
//!
//! Handles line unfolding and splitting content lines into name, parameters
//! and value.

use std::collections::BTreeMap;

use crate::error::ParseErrorKind;

/// One unfolded line together with the physical lines it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalLine {
    pub text: String,
    /// 1-based physical line of the first segment
    pub first_line: usize,
    /// 1-based physical line of the last folded segment
    pub last_line: usize,
}

/// A parsed content line: `name *(";" param) ":" value`
#[derive(Debug, Clone, PartialEq)]
pub struct ContentLine {
    pub name: String,
    pub params: BTreeMap<String, String>,
    pub value: String,
    pub line: usize,
}

impl ContentLine {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// `VALUE=DATE`, compared case-insensitively
    pub fn is_date_value(&self) -> bool {
        self.param("VALUE")
            .is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
    }
}

/// Splits input into physical lines, accepting CRLF, bare LF and bare CR.
pub fn physical_lines(input: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let bytes = input.as_bytes();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                lines.push(&input[start..i]);
                if i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
                    i += 1;
                }
                start = i + 1;
            }
            b'\n' => {
                lines.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }

    if start < input.len() {
        lines.push(&input[start..]);
    }

    lines
}

/// Merges folded continuations into logical lines.
///
/// A line starting with a single SPACE or HTAB continues the previous line;
/// that one whitespace character is removed and nothing is inserted.
pub fn unfold(lines: &[&str]) -> Vec<LogicalLine> {
    let mut logical: Vec<LogicalLine> = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let line_num = i + 1;

        if let Some(continuation) = line.strip_prefix([' ', '\t']) {
            if let Some(prev) = logical.last_mut() {
                prev.text.push_str(continuation);
                prev.last_line = line_num;
                continue;
            }
        }

        if line.trim().is_empty() {
            continue;
        }

        logical.push(LogicalLine {
            text: line.to_string(),
            first_line: line_num,
            last_line: line_num,
        });
    }

    logical
}

/// Parses a single logical line.
///
/// The line is split at the first colon that is not inside a double-quoted
/// parameter value.
pub fn parse_content_line(line: &str, line_num: usize) -> Result<ContentLine, ParseErrorKind> {
    let colon = find_unquoted(line, ':').ok_or_else(|| malformed(line))?;

    let head = &line[..colon];
    let value = &line[colon + 1..];

    let mut segments = split_unquoted(head, ';').into_iter();
    let name = segments
        .next()
        .map(|n| n.trim().to_ascii_uppercase())
        .unwrap_or_default();

    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(malformed(line));
    }

    let mut params = BTreeMap::new();
    for segment in segments {
        if segment.is_empty() {
            continue;
        }
        let (key, val) = segment.split_once('=').unwrap_or((segment, ""));
        params.insert(key.trim().to_ascii_uppercase(), val.replace('"', ""));
    }

    Ok(ContentLine {
        name,
        params,
        value: value.to_string(),
        line: line_num,
    })
}

fn malformed(line: &str) -> ParseErrorKind {
    let preview: String = line.chars().take(40).collect();
    ParseErrorKind::MalformedLine(preview)
}

fn find_unquoted(s: &str, needle: char) -> Option<usize> {
    let mut in_quotes = false;
    for (i, c) in s.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == needle && !in_quotes {
            return Some(i);
        }
    }
    None
}

fn split_unquoted(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == separator && !in_quotes {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);

    parts
}
