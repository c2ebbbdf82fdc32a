//! Delimited file parsing and column type inference.

use crate::error::{PipelineError, Result};
use crate::models::{Cell, Column, ColumnType, Table};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use tracing::debug;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Read a delimited file with a header row into a typed [`Table`].
///
/// Any malformed row aborts the whole file.
pub fn read_table(table: &str, path: &Path, delimiter: u8) -> Result<Table> {
    let file = File::open(path).map_err(|source| PipelineError::Io {
        table: table.to_string(),
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| csv_error(table, path, e))?
        .clone();
    let names = validate_headers(table, &headers)?;

    let mut raw: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(table, path, e))?;
        raw.push(record.iter().map(str::to_string).collect());
    }

    let columns: Vec<Column> = names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| Column {
            name,
            column_type: infer_type(raw.iter().map(|row| row[idx].as_str())),
        })
        .collect();

    let rows = raw
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(&columns)
                .map(|(value, column)| parse_cell(&value, column.column_type))
                .collect()
        })
        .collect::<Vec<Vec<Cell>>>();

    debug!(
        "Parsed {} rows x {} columns from {}",
        rows.len(),
        columns.len(),
        path.display()
    );

    Ok(Table {
        name: table.to_string(),
        columns,
        rows,
    })
}

fn validate_headers(table: &str, headers: &csv::StringRecord) -> Result<Vec<String>> {
    if headers.is_empty() || headers.iter().all(str::is_empty) {
        return Err(PipelineError::schema(table, "missing header row"));
    }

    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(headers.len());
    for (idx, name) in headers.iter().enumerate() {
        if name.is_empty() {
            return Err(PipelineError::schema(
                table,
                format!("column {} has a blank header", idx + 1),
            ));
        }
        if !seen.insert(name) {
            return Err(PipelineError::schema(
                table,
                format!("duplicate column '{}'", name),
            ));
        }
        names.push(name.to_string());
    }
    Ok(names)
}

fn csv_error(table: &str, path: &Path, err: csv::Error) -> PipelineError {
    let line = err.position().map(|p| p.line());
    match err.into_kind() {
        csv::ErrorKind::Io(source) => PipelineError::Io {
            table: table.to_string(),
            path: path.to_path_buf(),
            source,
        },
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => PipelineError::schema(
            table,
            format!(
                "line {}: expected {} fields, found {}",
                line.unwrap_or(0),
                expected_len,
                len
            ),
        ),
        csv::ErrorKind::Utf8 { err, .. } => PipelineError::schema(
            table,
            format!("line {}: invalid UTF-8 ({})", line.unwrap_or(0), err),
        ),
        other => PipelineError::schema(table, format!("{:?}", other)),
    }
}

/// Pick the narrowest type every non-empty value parses as.
pub fn infer_type<'a>(values: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut integer = true;
    let mut float = true;
    let mut date = true;
    let mut any = false;

    for value in values.filter(|v| !v.is_empty()) {
        any = true;
        integer = integer && value.parse::<i64>().is_ok();
        float = float && parse_float(value).is_some();
        date = date && NaiveDate::parse_from_str(value, DATE_FORMAT).is_ok();
        if !integer && !float && !date {
            break;
        }
    }

    if !any {
        ColumnType::Text
    } else if integer {
        ColumnType::Integer
    } else if float {
        ColumnType::Float
    } else if date {
        ColumnType::Date
    } else {
        ColumnType::Text
    }
}

fn parse_float(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_cell(value: &str, column_type: ColumnType) -> Cell {
    if value.is_empty() {
        return Cell::Null;
    }
    // Inference guarantees these parses succeed; fall back to text regardless.
    match column_type {
        ColumnType::Integer => value
            .parse()
            .map(Cell::Integer)
            .unwrap_or_else(|_| Cell::Text(value.to_string())),
        ColumnType::Float => parse_float(value)
            .map(Cell::Float)
            .unwrap_or_else(|| Cell::Text(value.to_string())),
        ColumnType::Date => NaiveDate::parse_from_str(value, DATE_FORMAT)
            .map(Cell::Date)
            .unwrap_or_else(|_| Cell::Text(value.to_string())),
        ColumnType::Text => Cell::Text(value.to_string()),
    }
}
