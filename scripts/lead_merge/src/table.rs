//! Loading export files into `RawRow`s
//!
//! Spreadsheets go through calamine (first sheet only), CSV through the csv
//! crate after the same decode cascade the repair pass uses.

use crate::error::{MergeError, Result};
use crate::repair::{decode_bytes, repair_csv};
use crate::types::RawRow;
use calamine::{open_workbook_auto, Data, Reader};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Parse CSV text with a header row into rows keyed by trimmed header names.
///
/// Rows may be shorter or longer than the header; missing cells read as absent
/// and surplus cells are dropped. Rows with no non-blank cell are skipped.
pub fn rows_from_csv_str(text: &str, delimiter: u8) -> csv::Result<Vec<RawRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = RawRow::from_pairs(
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.as_str(), v)),
        );
        if !row.is_blank() {
            rows.push(row);
        }
    }

    Ok(rows)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| MergeError::read(file_label(path), e))
}

/// Read a CSV export as-is
pub fn read_csv_file(path: &Path, delimiter: u8) -> Result<Vec<RawRow>> {
    let label = file_label(path);
    let decoded = decode_bytes(&read_bytes(path)?);
    debug!(file = %label, encoding = %decoded.encoding, "Decoded CSV");

    rows_from_csv_str(&decoded.text, delimiter).map_err(|e| MergeError::read(label, e))
}

/// Repair a malformed CSV export, then read it.
///
/// A parse failure after repair is reported as `RepairFailed`.
pub fn read_repaired_csv(path: &Path, delimiter: u8) -> Result<Vec<RawRow>> {
    let label = file_label(path);
    let repaired = repair_csv(&read_bytes(path)?, delimiter, &label)?;
    info!(file = %label, rows = repaired.rows, encoding = %repaired.encoding, "Repaired CSV");

    rows_from_csv_str(&repaired.text, delimiter).map_err(|e| MergeError::repair_failed(label, e))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}

/// Read the first sheet of an `.xlsx`/`.xls` workbook; the first row is the header
pub fn read_workbook(path: &Path) -> Result<Vec<RawRow>> {
    let label = file_label(path);
    let mut workbook = open_workbook_auto(path).map_err(|e| MergeError::read(&label, e))?;

    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(|e| MergeError::read(&label, e))?,
        None => return Err(MergeError::read(label, "workbook has no sheets")),
    };

    let mut sheet_rows = range.rows();
    let headers: Vec<String> = match sheet_rows.next() {
        Some(header) => header.iter().map(|c| cell_text(c).trim().to_string()).collect(),
        None => return Ok(Vec::new()),
    };

    let rows: Vec<RawRow> = sheet_rows
        .map(|cells| {
            RawRow::from_pairs(
                headers
                    .iter()
                    .zip(cells.iter())
                    .map(|(h, c)| (h.clone(), cell_text(c))),
            )
        })
        .filter(|row| !row.is_blank())
        .collect();

    debug!(file = %label, rows = rows.len(), "Read workbook");
    Ok(rows)
}

/// Read an export, choosing the reader by file extension (`.csv` or spreadsheet)
pub fn read_table(path: &Path, delimiter: u8) -> Result<Vec<RawRow>> {
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    if is_csv {
        read_csv_file(path, delimiter)
    } else {
        read_workbook(path)
    }
}
