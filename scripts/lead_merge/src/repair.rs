//! CSV Repair Module
//!
//! Fixes Autohome exports whose quoting is inconsistent:
//! - whole rows wrapped in one extra layer of quotes
//! - internal quotes doubled instead of escaped per RFC 4180
//! - files saved as GBK/GB18030 instead of UTF-8
//!
//! The repaired text is re-emitted as standard CSV so fields that carry the
//! delimiter survive a normal CSV reader.

use crate::error::{MergeError, Result};
use encoding_rs::GB18030;
use std::io;
use tracing::{debug, warn};

/// Stand-in for a doubled quote while the line is split (private-use codepoint).
const QUOTE_SENTINEL: &str = "\u{E000}";

/// Which step of the decode cascade produced the text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Gb18030,
    Utf8Lossy,
}

impl std::fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::Gb18030 => "GB18030",
            TextEncoding::Utf8Lossy => "UTF-8 (lossy)",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct DecodedText {
    pub text: String,
    pub encoding: TextEncoding,
}

/// Decode raw export bytes: UTF-8 (BOM stripped), then GB18030, then lossy UTF-8.
///
/// Never fails; the last step substitutes invalid bytes.
pub fn decode_bytes(bytes: &[u8]) -> DecodedText {
    let without_bom = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    if let Ok(text) = std::str::from_utf8(without_bom) {
        return DecodedText {
            text: text.to_string(),
            encoding: TextEncoding::Utf8,
        };
    }

    if let Some(text) = GB18030.decode_without_bom_handling_and_without_replacement(without_bom) {
        debug!("Decoded input as GB18030");
        return DecodedText {
            text: text.into_owned(),
            encoding: TextEncoding::Gb18030,
        };
    }

    warn!("Input is neither UTF-8 nor GB18030, decoding with replacement characters");
    DecodedText {
        text: String::from_utf8_lossy(without_bom).into_owned(),
        encoding: TextEncoding::Utf8Lossy,
    }
}

/// Output of a repair pass
#[derive(Debug, Clone)]
pub struct RepairedCsv {
    pub text: String,
    pub encoding: TextEncoding,
    /// Data rows emitted (header excluded)
    pub rows: usize,
}

/// Decode and repair an export file's bytes.
///
/// `file` only labels the error.
pub fn repair_csv(bytes: &[u8], delimiter: u8, file: &str) -> Result<RepairedCsv> {
    let decoded = decode_bytes(bytes);
    let (text, rows) = repair_csv_text(&decoded.text, delimiter)
        .map_err(|e| MergeError::repair_failed(file, e))?;

    Ok(RepairedCsv {
        text,
        encoding: decoded.encoding,
        rows,
    })
}

/// Repair already-decoded text, returning the fixed text and its data row count.
///
/// Line 0 is the header and is only trimmed. Blank lines are dropped.
pub fn repair_csv_text(text: &str, delimiter: u8) -> csv::Result<(String, usize)> {
    let mut lines = text.lines();
    let header = match lines.next() {
        Some(header) => header,
        None => return Ok((String::new(), 0)),
    };

    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    let mut rows = 0;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        writer.write_record(split_quoted_line(line, delimiter as char))?;
        rows += 1;
    }

    let body = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    let body = String::from_utf8(body)
        .map_err(|e| csv::Error::from(io::Error::new(io::ErrorKind::InvalidData, e)))?;

    let mut out = String::with_capacity(header.len() + body.len() + 1);
    out.push_str(header.trim());
    let body = body.trim_end_matches('\n');
    if !body.is_empty() {
        out.push('\n');
        out.push_str(body);
    }

    Ok((out, rows))
}

/// Split one malformed data line into its fields.
///
/// Quote characters toggle a quoted span and are consumed; the delimiter only
/// splits outside a span. Doubled quotes come back as a literal `"`.
pub fn split_quoted_line(line: &str, delimiter: char) -> Vec<String> {
    let line = strip_outer_quotes(line, delimiter).replace("\"\"", QUOTE_SENTINEL);

    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);

    fields
        .iter()
        .map(|field| strip_wrapping_quotes(field).replace(QUOTE_SENTINEL, "\""))
        .collect()
}

/// Strip the outer quote pair of a line that starts and ends with `"`.
///
/// A line that is already valid CSV with more than one field (`"a","b"`) is
/// left alone. Anything else wrapped in quotes is one extra quoting layer:
/// `"a,""b"",c"` and `"a,"b,c",d"` are both unwrapped.
fn strip_outer_quotes(line: &str, delimiter: char) -> &str {
    if line.len() < 2 || !line.starts_with('"') || !line.ends_with('"') {
        return line;
    }
    match standard_field_count(line, delimiter) {
        Some(fields) if fields > 1 => line,
        _ => &line[1..line.len() - 1],
    }
}

/// Field count of a line that parses as RFC 4180 CSV, `None` if any quoted
/// field does not close cleanly or a bare field contains a quote.
fn standard_field_count(line: &str, delimiter: char) -> Option<usize> {
    let mut fields = 1;
    let mut at_field_start = true;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == delimiter {
            fields += 1;
            at_field_start = true;
        } else if ch == '"' && at_field_start {
            loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                    }
                    Some('"') => break,
                    Some(_) => {}
                    None => return None,
                }
            }
            match chars.next() {
                None => return Some(fields),
                Some(c) if c == delimiter => fields += 1,
                Some(_) => return None,
            }
        } else if ch == '"' {
            return None;
        } else {
            at_field_start = false;
        }
    }

    Some(fields)
}

fn strip_wrapping_quotes(field: &str) -> &str {
    if field.len() >= 2 && field.starts_with('"') && field.ends_with('"') {
        &field[1..field.len() - 1]
    } else {
        field
    }
}
