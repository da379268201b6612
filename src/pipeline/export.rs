//! Spreadsheet export: result table → `.xlsx` bytes → file.
//!
//! One worksheet, a header row, one row per record, no formatting. The
//! workbook creation timestamp is pinned to the export date so that the same
//! table exported on the same day produces identical bytes.

use crate::error::ExtractError;
use crate::output::ResultTable;
use chrono::{Datelike, NaiveDate};
use rust_xlsxwriter::{DocProperties, ExcelDateTime, Workbook, Worksheet};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// MIME type of the exported workbook.
pub const XLSX_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const SHEET_NAME: &str = "Sheet1";

/// Longest string Excel accepts in a single cell, in characters.
pub const MAX_CELL_CHARS: usize = 32_767;

/// `epc_data_<DD_MM_YY>.xlsx` for the given date.
pub fn export_file_name(date: NaiveDate) -> String {
    format!("epc_data_{}.xlsx", date.format("%d_%m_%y"))
}

/// Today's date in local time, as used for the export file name.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Serialise `table` to an in-memory `.xlsx` workbook.
pub fn write_xlsx(table: &ResultTable, date: NaiveDate) -> Result<Vec<u8>, ExtractError> {
    let mut workbook = Workbook::new();

    let created = ExcelDateTime::from_ymd(date.year() as u16, date.month() as u8, date.day() as u8)?;
    let properties = DocProperties::new().set_creation_datetime(&created);
    workbook.set_properties(&properties);

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (col, name) in table.columns.iter().enumerate() {
        worksheet.write_string(0, col as u16, name)?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let row_idx = (r + 1) as u32;
        let file_name = row.first().and_then(Value::as_str).unwrap_or("?");
        for (col, cell_value) in row.iter().enumerate() {
            let column = table.columns.get(col).map(String::as_str).unwrap_or("?");
            let cell = CellRef {
                row: row_idx,
                col: col as u16,
                file_name,
                column,
            };
            write_cell(worksheet, &cell, cell_value)?;
        }
    }

    let bytes = workbook.save_to_buffer()?;
    debug!(
        "Built workbook: {} rows x {} columns, {} bytes",
        table.row_count(),
        table.column_count(),
        bytes.len()
    );
    Ok(bytes)
}

/// Position of a cell plus the names used in log messages.
struct CellRef<'a> {
    row: u32,
    col: u16,
    file_name: &'a str,
    column: &'a str,
}

fn write_cell(ws: &mut Worksheet, at: &CellRef<'_>, value: &Value) -> Result<(), ExtractError> {
    let (row, col) = (at.row, at.col);
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            ws.write_boolean(row, col, *b)?;
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) => {
                ws.write_number(row, col, f)?;
            }
            None => {
                ws.write_string(row, col, n.to_string())?;
            }
        },
        Value::String(s) => {
            ws.write_string(row, col, clip_to_cell(s, at))?;
        }
        other => {
            let json = other.to_string();
            ws.write_string(row, col, clip_to_cell(&json, at))?;
        }
    }
    Ok(())
}

/// Cut `s` to [`MAX_CELL_CHARS`] on a char boundary so one oversized value
/// cannot fail the whole export.
fn clip_to_cell<'s>(s: &'s str, at: &CellRef<'_>) -> &'s str {
    match s.char_indices().nth(MAX_CELL_CHARS) {
        Some((byte_idx, _)) => {
            warn!(
                "{}: value for '{}' clipped to {} chars for the spreadsheet",
                at.file_name, at.column, MAX_CELL_CHARS
            );
            &s[..byte_idx]
        }
        None => s,
    }
}

/// Write the workbook for `table` into `dir` and return the file path.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn export_to_dir(
    table: &ResultTable,
    dir: impl AsRef<Path>,
    date: NaiveDate,
) -> Result<PathBuf, ExtractError> {
    let dir = dir.as_ref();
    let path = dir.join(export_file_name(date));
    let bytes = write_xlsx(table, date)?;

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ExtractError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;

    let tmp_path = path.with_extension("xlsx.tmp");
    tokio::fs::write(&tmp_path, &bytes)
        .await
        .map_err(|e| ExtractError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, &path)
        .await
        .map_err(|e| ExtractError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;

    info!("Exported {} rows to {}", table.row_count(), path.display());
    Ok(path)
}
