use bytes::Bytes;
use reqwest::Client;
use smallvec::SmallVec;
use std::collections::HashSet;

use crate::error::AppError;
use crate::models::{CellValue, Row, Table};

pub const SAMPLE_SIZE: usize = 3;

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    fn new(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub struct ColumnSummary {
    pub name: String,
    pub data_type: String,
    pub sample_values: SmallVec<[String; SAMPLE_SIZE]>,
    pub null_count: usize,
}

/// Parses raw CSV bytes into a `Table`. The header row is the first
/// non-empty line; blank lines never emit a row; the parse either fully
/// succeeds or fails with the first problem encountered.
pub fn parse(bytes: &[u8]) -> Result<Table, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let header_record = reader
        .headers()
        .map_err(|e| ParseError::new(e.to_string()))?
        .clone();

    // Duplicate header names collapse to one column, first-seen order.
    let mut headers = Vec::new();
    let mut seen = HashSet::new();
    for name in header_record.iter() {
        let name = name.trim().to_string();
        if seen.insert(name.clone()) {
            headers.push(name);
        }
    }

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(ParseError::new("file has no header row"));
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ParseError::new(e.to_string()))?;
        let mut row = Row::new();
        for (idx, name) in header_record.iter().enumerate() {
            // Missing trailing fields stay absent; for duplicate header
            // names the last occurrence wins.
            if let Some(cell) = record.get(idx) {
                row.insert(name.trim().to_string(), coerce_cell(cell));
            }
        }
        rows.push(row);
    }

    Ok(Table { headers, rows })
}

fn coerce_cell(raw: &str) -> CellValue {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        if let Ok(n) = trimmed.parse::<f64>() {
            if n.is_finite() {
                return CellValue::Number(n);
            }
        }
    }
    CellValue::Text(raw.to_string())
}

/// Round-trips the headers plus the first `row_limit` rows back into CSV
/// text. Missing fields render as empty cells. Used to embed a bounded data
/// snippet in the model prompt.
pub fn serialize_table(table: &Table, row_limit: usize) -> Result<String, ParseError> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());

    writer
        .write_record(&table.headers)
        .map_err(|e| ParseError::new(e.to_string()))?;

    for row in table.rows.iter().take(row_limit) {
        let record: Vec<String> = table
            .headers
            .iter()
            .map(|h| row.get(h).map(|v| v.to_string()).unwrap_or_default())
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| ParseError::new(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ParseError::new(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ParseError::new(e.to_string()))
}

/// Per-column preview summary: detected type, a few sample values and the
/// null count (missing fields plus blank cells).
pub fn summarize_columns(table: &Table) -> Vec<ColumnSummary> {
    table
        .headers
        .iter()
        .map(|name| {
            let mut null_count = 0;
            let mut numeric_count = 0;
            let mut present_count = 0;
            let mut sample_values = SmallVec::new();

            for (i, row) in table.rows.iter().enumerate() {
                let cell = row.get(name);
                match cell {
                    Some(CellValue::Number(_)) => {
                        numeric_count += 1;
                        present_count += 1;
                    }
                    Some(CellValue::Text(s)) if !s.trim().is_empty() => present_count += 1,
                    _ => null_count += 1,
                }
                if i < SAMPLE_SIZE {
                    sample_values.push(cell.map(|v| v.to_string()).unwrap_or_default());
                }
            }

            ColumnSummary {
                name: name.clone(),
                data_type: detect_column_type(present_count, numeric_count).to_string(),
                sample_values,
                null_count,
            }
        })
        .collect()
}

fn detect_column_type(present_count: usize, numeric_count: usize) -> &'static str {
    if present_count == 0 {
        return "empty";
    }
    let numeric_ratio = numeric_count as f64 / present_count as f64;
    if numeric_ratio > 0.5 {
        "numeric"
    } else {
        "string"
    }
}

/// First few rows rendered as strings in header order for the preview.
pub fn sample_rows(table: &Table) -> Vec<Vec<String>> {
    table
        .rows
        .iter()
        .take(SAMPLE_SIZE)
        .map(|row| {
            table
                .headers
                .iter()
                .map(|h| row.get(h).map(|v| v.to_string()).unwrap_or_default())
                .collect()
        })
        .collect()
}

pub async fn load_file_from_url(url: &str) -> Result<Bytes, AppError> {
    let client = Client::new();
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::FileFetch(format!("Failed to fetch file: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::FileFetch(format!(
            "Failed to fetch file. Status: {}",
            response.status()
        )));
    }

    response
        .bytes()
        .await
        .map_err(|e| AppError::FileFetch(format!("Failed to read response bytes: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(csv: &str) -> Table {
        parse(csv.as_bytes()).expect("parse failed")
    }

    #[test]
    fn parses_headers_and_typed_rows() {
        let t = table("name,age\nAlice,30\nBob,25");
        assert_eq!(t.headers, vec!["name", "age"]);
        assert_eq!(t.rows.len(), 2);
        assert_eq!(
            t.rows[0].get("name"),
            Some(&CellValue::Text("Alice".to_string()))
        );
        assert_eq!(t.rows[0].get("age"), Some(&CellValue::Number(30.0)));
        assert_eq!(t.rows[1].get("age"), Some(&CellValue::Number(25.0)));
    }

    #[test]
    fn skips_empty_lines_entirely() {
        let t = table("a,b\n\n1,2\n\n3,4\n");
        assert_eq!(t.rows.len(), 2);
    }

    #[test]
    fn coerces_numeric_literals_cell_locally() {
        let t = table("v\n42\n3.14\n-1\n42abc\n 7 ");
        assert_eq!(t.rows[0].get("v"), Some(&CellValue::Number(42.0)));
        assert_eq!(t.rows[1].get("v"), Some(&CellValue::Number(3.14)));
        assert_eq!(t.rows[2].get("v"), Some(&CellValue::Number(-1.0)));
        assert_eq!(
            t.rows[3].get("v"),
            Some(&CellValue::Text("42abc".to_string()))
        );
        assert_eq!(t.rows[4].get("v"), Some(&CellValue::Number(7.0)));
    }

    #[test]
    fn short_rows_leave_fields_absent() {
        let t = table("a,b,c\n1,2");
        assert_eq!(t.rows[0].get("a"), Some(&CellValue::Number(1.0)));
        assert_eq!(t.rows[0].get("b"), Some(&CellValue::Number(2.0)));
        assert!(t.rows[0].get("c").is_none());
    }

    #[test]
    fn empty_cell_is_present_empty_text() {
        let t = table("a,b\n1,");
        assert_eq!(t.rows[0].get("b"), Some(&CellValue::Text(String::new())));
    }

    #[test]
    fn duplicate_headers_collapse_last_write_wins() {
        let t = table("x,x\n1,2");
        assert_eq!(t.headers, vec!["x"]);
        assert_eq!(t.rows[0].get("x"), Some(&CellValue::Number(2.0)));
    }

    #[test]
    fn empty_input_is_a_parse_error() {
        assert!(parse(b"").is_err());
        assert!(parse(b"\n\n").is_err());
    }

    #[test]
    fn round_trips_through_csv_text() {
        let t = table("name,age\nAlice,30\nBob,25");
        let text = serialize_table(&t, 100).unwrap();
        let reparsed = parse(text.as_bytes()).unwrap();
        assert_eq!(t, reparsed);
    }

    #[test]
    fn serialization_respects_row_limit() {
        let mut csv = String::from("n\n");
        for i in 0..120 {
            csv.push_str(&format!("{}\n", i));
        }
        let t = table(&csv);
        assert_eq!(t.rows.len(), 120);

        let text = serialize_table(&t, 100).unwrap();
        let truncated = parse(text.as_bytes()).unwrap();
        assert_eq!(truncated.rows.len(), 100);
        assert_eq!(truncated.headers, t.headers);
        assert_eq!(truncated.rows[..], t.rows[..100]);
    }

    #[test]
    fn summarizes_column_types_and_nulls() {
        let t = table("name,age,notes\nAlice,30,\nBob,25,fast\nEve,x,");
        let summaries = summarize_columns(&t);
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].data_type, "string");
        assert_eq!(summaries[1].data_type, "numeric");
        assert_eq!(summaries[2].null_count, 2);
        assert_eq!(summaries[0].sample_values.as_slice(), ["Alice", "Bob", "Eve"]);
    }

    #[test]
    fn sample_rows_render_in_header_order() {
        let t = table("a,b\n1,x\n2,y\n3,z\n4,w");
        let sample = sample_rows(&t);
        assert_eq!(sample.len(), SAMPLE_SIZE);
        assert_eq!(sample[0], vec!["1", "x"]);
        assert_eq!(sample[2], vec!["3", "z"]);
    }
}
