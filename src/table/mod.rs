//! Tabular side of the pipeline: delimited-text ingestion with
//! caller-named columns, plus the ZIP×year group-by.

pub mod agg;

pub use agg::{aggregate, rate, KeyedRow, Reducer, Value};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::PipelineError;
use crate::ident::resolve_identifier_column;

/// An in-memory delimited table: header row plus raw string records.
/// Column names are data, not schema; every tool resolves the columns it
/// needs by name at runtime.
#[derive(Debug, Clone)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<StringRecord>,
}

impl Table {
    /// Index of a required column; fatal with the found-columns list if
    /// absent. Same contract as the polygon-side identifier resolver.
    pub fn column(&self, name: &str) -> Result<usize, PipelineError> {
        let resolved = resolve_identifier_column(&self.headers, &[name])?;
        Ok(self.headers.iter().position(|h| *h == resolved).unwrap())
    }

    /// Index of an optional column.
    pub fn column_opt(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Field of `row` at `idx`, empty string for short rows.
    pub fn field<'a>(&self, row: &'a StringRecord, idx: usize) -> &'a str {
        row.get(idx).unwrap_or("")
    }
}

/// Read a comma-delimited file.
pub fn read_csv(path: &Path) -> Result<Table> {
    read_delimited(path, b',')
}

/// Read a delimited file, sniffing the delimiter from the header line
/// (comma, semicolon, or tab — the storm-treatment exports vary).
pub fn read_csv_sniffed(path: &Path) -> Result<Table> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let header = text.lines().next().unwrap_or("");
    let delimiter = [b',', b';', b'\t']
        .into_iter()
        .max_by_key(|d| header.matches(*d as char).count())
        .unwrap_or(b',');
    debug!(
        "sniffed delimiter {:?} for {}",
        delimiter as char,
        path.display()
    );
    read_delimited(path, delimiter)
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers: Vec<String> = rdr
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let mut rows = Vec::new();
    for record in rdr.records() {
        rows.push(record.with_context(|| format!("reading row of {}", path.display()))?);
    }
    Ok(Table { headers, rows })
}

/// Normalize a messy header row in place: trim and lowercase every name
/// and drop pandas-style `unnamed*` index artifacts (with their data).
pub fn canonicalize_headers(table: &mut Table) {
    let keep: Vec<usize> = table
        .headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| {
            let name = h.trim().to_lowercase();
            (!name.starts_with("unnamed")).then_some(i)
        })
        .collect();
    if keep.len() != table.headers.len() {
        table.rows = table
            .rows
            .iter()
            .map(|row| {
                keep.iter()
                    .map(|&i| row.get(i).unwrap_or(""))
                    .collect::<StringRecord>()
            })
            .collect();
        table.headers = keep
            .iter()
            .map(|&i| table.headers[i].trim().to_lowercase())
            .collect();
    } else {
        for h in &mut table.headers {
            *h = h.trim().to_lowercase();
        }
    }
}

/// Numeric coercion for a measure field: empty/non-numeric is absent.
pub fn parse_num(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}
