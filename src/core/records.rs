use crate::core::source::RowIter;
use crate::domain::model::Row;
use crate::utils::error::{Result, ScanError};
use serde_json::{Map, Value};
use std::collections::HashSet;

type Record = Map<String, Value>;

/// Structured records in one of three layouts, tried in order:
/// an array of objects, one object per line, or a single object.
pub struct RecordsAdapter {
    records: Vec<Record>,
    columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLayout {
    Array,
    Lines,
    SingleObject,
}

impl RecordsAdapter {
    pub fn open(data: &[u8]) -> Result<Self> {
        let (layout, records) = parse_records(data)?;
        if records.is_empty() {
            return Err(ScanError::EmptyFileError);
        }
        tracing::debug!(
            "Read {} structured records using {:?} layout",
            records.len(),
            layout
        );

        let columns = collect_columns(&records);
        Ok(Self { records, columns })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn estimate_rows(&self) -> Option<u64> {
        Some(self.records.len() as u64)
    }

    pub fn rows(&self) -> RowIter<'_> {
        Box::new(self.records.iter().map(|record| {
            Ok(self
                .columns
                .iter()
                .map(|column| record.get(column).and_then(value_text))
                .collect::<Row>())
        }))
    }
}

pub fn parse_records(data: &[u8]) -> Result<(RecordLayout, Vec<Record>)> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);

    let array_err = match serde_json::from_slice::<Vec<Value>>(data) {
        Ok(items) => match into_records(items) {
            Ok(records) => return Ok((RecordLayout::Array, records)),
            Err(e) => e,
        },
        Err(e) => e.to_string(),
    };
    tracing::debug!("Not an array of records: {}", array_err);

    let lines_err = match parse_lines(data) {
        Ok(records) => return Ok((RecordLayout::Lines, records)),
        Err(e) => e,
    };
    tracing::debug!("Not one record per line: {}", lines_err);

    let object_err = match serde_json::from_slice::<Record>(data) {
        Ok(record) => return Ok((RecordLayout::SingleObject, vec![record])),
        Err(e) => e.to_string(),
    };

    Err(ScanError::parse(format!(
        "Could not parse JSON file. Tried array, lines, and object formats. Error: {}",
        object_err
    )))
}

fn into_records(items: Vec<Value>) -> std::result::Result<Vec<Record>, String> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(format!("element {} is not an object: {}", i, type_name(&other))),
        })
        .collect()
}

fn parse_lines(data: &[u8]) -> std::result::Result<Vec<Record>, String> {
    let mut records = Vec::new();
    for (number, line) in data.split(|b| *b == b'\n').enumerate() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let record = serde_json::from_slice::<Record>(line)
            .map_err(|e| format!("line {}: {}", number + 1, e))?;
        records.push(record);
    }

    if records.is_empty() {
        return Err("no records found".to_string());
    }
    Ok(records)
}

/// Union of record keys in first-seen order, so the column set never
/// depends on where chunk boundaries fall.
fn collect_columns(records: &[Record]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    for record in records {
        for key in record.keys() {
            if seen.insert(key.as_str()) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
