//! CSV transforms
//!
//! Both transforms read the whole document, tolerate ragged rows, and write
//! `\n`-terminated records with quoting only where needed.

use std::collections::HashMap;

use super::traits::{Transform, TransformError};
use super::types::TransformParams;

type Row = Vec<String>;

fn read_rows(input: &[u8]) -> Result<Vec<Row>, TransformError> {
    let text = std::str::from_utf8(input)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|cell| cell.trim().to_string()).collect());
    }
    Ok(rows)
}

fn write_rows(rows: &[Row]) -> Result<Vec<u8>, TransformError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    for row in rows {
        writer.write_record(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| TransformError::MalformedContent(e.to_string()))
}

fn is_blank(row: &Row) -> bool {
    row.iter().all(String::is_empty)
}

/// Splits off the header row when `has_header` is set
fn split_header(
    mut rows: Vec<Row>,
    params: &TransformParams,
) -> Result<(Option<Row>, Vec<Row>), TransformError> {
    if params.bool_option("has_header", true)? && !rows.is_empty() {
        let header = rows.remove(0);
        Ok((Some(header), rows))
    } else {
        Ok((None, rows))
    }
}

/// Trims cells and drops blank rows
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvNormalize;

impl Transform for CsvNormalize {
    fn apply(&self, input: &[u8], params: &TransformParams) -> Result<Vec<u8>, TransformError> {
        let (header, rows) = split_header(read_rows(input)?, params)?;

        let output: Vec<Row> = header
            .into_iter()
            .chain(rows.into_iter().filter(|row| !is_blank(row)))
            .collect();

        write_rows(&output)
    }
}

/// Merges rows that share a key column value
///
/// The first row seen for a key keeps its position; its empty cells are
/// filled from later rows with the same key. Rows with an empty key are
/// never merged.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvDedupe;

impl Transform for CsvDedupe {
    fn apply(&self, input: &[u8], params: &TransformParams) -> Result<Vec<u8>, TransformError> {
        let key_column = params.usize_option("key_column", 0)?;
        let (header, rows) = split_header(read_rows(input)?, params)?;

        let mut merged: Vec<Row> = Vec::with_capacity(rows.len());
        let mut positions: HashMap<String, usize> = HashMap::new();

        for row in rows.into_iter().filter(|row| !is_blank(row)) {
            let key = row.get(key_column).cloned().unwrap_or_default();
            if key.is_empty() {
                merged.push(row);
                continue;
            }

            match positions.get(&key) {
                Some(&index) => fill_gaps(&mut merged[index], row),
                None => {
                    positions.insert(key, merged.len());
                    merged.push(row);
                }
            }
        }

        let output: Vec<Row> = header.into_iter().chain(merged).collect();
        write_rows(&output)
    }
}

fn fill_gaps(existing: &mut Row, incoming: Row) {
    for (index, cell) in incoming.into_iter().enumerate() {
        match existing.get_mut(index) {
            Some(slot) if slot.is_empty() => *slot = cell,
            Some(_) => {}
            None => existing.push(cell),
        }
    }
}
