use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use calamine::{Data, Reader, Xlsx, open_workbook};
use rust_xlsxwriter::{Workbook, Worksheet};
use serde_json::{Number, Value};

use crate::dataset::Dataset;
use crate::flatten::FlatRow;

pub const SHEET_NAME: &str = "Matches";

const WIDTH_PADDING: usize = 2;

/// Largest integer an f64 cell holds exactly (2^53).
const MAX_EXACT_INT: u64 = 1 << 53;

/// Write the dataset as a single-sheet workbook with a header row.
pub fn write_workbook(path: &Path, dataset: &Dataset) -> Result<()> {
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;
        write_header(sheet, &dataset.columns)?;
        write_rows(sheet, dataset)?;
        fit_columns(sheet, dataset)?;
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;
    Ok(())
}

/// Text shown for a cell, also used for width sizing. Nulls render empty.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Column widths: longest rendered value (header included) plus padding.
pub fn column_widths(dataset: &Dataset) -> Vec<usize> {
    dataset
        .columns
        .iter()
        .map(|column| {
            let longest = dataset
                .rows
                .iter()
                .filter_map(|row| row.get(column))
                .map(|value| display_text(value).chars().count())
                .max()
                .unwrap_or(0);
            longest.max(column.chars().count()) + WIDTH_PADDING
        })
        .collect()
}

fn write_header(sheet: &mut Worksheet, columns: &[String]) -> Result<()> {
    for (col_idx, name) in columns.iter().enumerate() {
        sheet
            .write_string(0, col_idx as u16, name)
            .with_context(|| format!("write header ({col_idx})"))?;
    }
    Ok(())
}

fn write_rows(sheet: &mut Worksheet, dataset: &Dataset) -> Result<()> {
    for (idx, row) in dataset.rows.iter().enumerate() {
        let row_idx = (idx + 1) as u32;
        for (col_idx, column) in dataset.columns.iter().enumerate() {
            let col_idx = col_idx as u16;
            let Some(value) = row.get(column) else {
                continue;
            };
            match value {
                Value::Null => continue,
                Value::Bool(b) => {
                    sheet.write_boolean(row_idx, col_idx, *b)?;
                }
                Value::Number(n) => match exact_f64(n) {
                    Some(f) => {
                        sheet.write_number(row_idx, col_idx, f)?;
                    }
                    None => {
                        sheet.write_string(row_idx, col_idx, n.to_string())?;
                    }
                },
                other => {
                    sheet
                        .write_string(row_idx, col_idx, display_text(other))
                        .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
                }
            }
        }
    }
    Ok(())
}

fn fit_columns(sheet: &mut Worksheet, dataset: &Dataset) -> Result<()> {
    for (col_idx, width) in column_widths(dataset).into_iter().enumerate() {
        sheet.set_column_width(col_idx as u16, width as f64)?;
    }
    Ok(())
}

/// Numeric cell value, or `None` when an f64 would not hold the number exactly.
pub fn exact_f64(n: &Number) -> Option<f64> {
    if let Some(i) = n.as_i64() {
        return (i.unsigned_abs() <= MAX_EXACT_INT).then_some(i as f64);
    }
    if let Some(u) = n.as_u64() {
        return (u <= MAX_EXACT_INT).then_some(u as f64);
    }
    n.as_f64()
}

/// Read the first sheet of a workbook back into a dataset.
///
/// The first row is the header. Empty cells read as null, whole-number cells
/// as integers; nested values written as JSON text come back as strings.
pub fn read_workbook(path: &Path) -> Result<Dataset> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .map_err(|err| anyhow!("failed opening workbook {}: {err}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("workbook {} has no sheets", path.display()))?
        .map_err(|err| anyhow!("failed reading workbook {}: {err}", path.display()))?;

    let mut lines = range.rows();
    let Some(header) = lines.next() else {
        return Ok(Dataset::default());
    };
    let header = header.iter().map(|cell| cell.to_string()).collect::<Vec<_>>();

    let mut seen = HashSet::new();
    let columns = header
        .iter()
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect::<Vec<_>>();

    let rows = lines
        .map(|cells| {
            let mut row = FlatRow::new();
            for (column, cell) in header.iter().zip(cells) {
                row.insert(column.clone(), cell_value(cell));
            }
            row
        })
        .collect();

    Ok(Dataset { columns, rows })
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::Bool(b) => Value::Bool(*b),
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => float_value(*f),
        Data::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

fn float_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() <= MAX_EXACT_INT as f64 {
        return Value::from(f as i64);
    }
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}
