use crate::core::source::{normalize_headers, RowIter};
use crate::domain::model::Row;
use crate::utils::error::{Result, ScanError};
use csv::{ByteRecord, ReaderBuilder};
use std::sync::Arc;

/// Comma-delimited text with a header row. Rows are streamed straight from
/// the byte buffer, so only the current chunk is ever materialised.
pub struct DelimitedAdapter {
    data: Arc<[u8]>,
    columns: Vec<String>,
    estimated_rows: Option<u64>,
}

impl DelimitedAdapter {
    pub fn open(data: Arc<[u8]>) -> Result<Self> {
        let mut reader = reader_for(&data);
        let headers = reader.byte_headers()?.clone();
        if headers.is_empty() {
            return Err(ScanError::EmptyFileError);
        }

        let mut first = ByteRecord::new();
        if !reader.read_byte_record(&mut first)? {
            return Err(ScanError::EmptyFileError);
        }

        let names = headers
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let name = decode_field(field, 1)?;
                Ok(if i == 0 {
                    name.trim_start_matches('\u{feff}').to_string()
                } else {
                    name
                })
            })
            .collect::<Result<Vec<String>>>()?;
        let columns = normalize_headers(names);

        let estimated_rows = Some(count_data_lines(&data));

        Ok(Self {
            data,
            columns,
            estimated_rows,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Line-terminator count minus the header line. `\n`, `\r\n` and a bare
    /// `\r` each end one line. Quoted line breaks and blank lines make this an
    /// over-estimate, never a parse.
    pub fn estimate_rows(&self) -> Option<u64> {
        self.estimated_rows
    }

    pub fn rows(&self) -> RowIter<'_> {
        let width = self.columns.len();
        let reader = reader_for(&self.data);

        Box::new(reader.into_byte_records().map(move |record| {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            if record.len() > width {
                return Err(ScanError::StructuralError {
                    message: format!(
                        "Expected {} fields in line {}, saw {}",
                        width,
                        line,
                        record.len()
                    ),
                });
            }

            let mut row: Row = record
                .iter()
                .map(|field| decode_field(field, line).map(Some))
                .collect::<Result<Row>>()?;
            // Short rows leave their trailing cells absent.
            row.resize(width, None);
            Ok(row)
        }))
    }
}

fn reader_for(data: &[u8]) -> csv::Reader<&[u8]> {
    ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data)
}

/// Cells are compared as exact strings, so invalid UTF-8 is rejected rather
/// than replaced: lossy decoding would fold distinct values together.
fn decode_field(field: &[u8], line: u64) -> Result<String> {
    String::from_utf8(field.to_vec())
        .map_err(|e| ScanError::parse(format!("Invalid UTF-8 in line {}: {}", line, e)))
}

fn count_data_lines(data: &[u8]) -> u64 {
    if data.is_empty() {
        return 0;
    }
    let mut lines = memchr::memchr2_iter(b'\n', b'\r', data)
        .filter(|&i| data[i] == b'\n' || data.get(i + 1) != Some(&b'\n'))
        .count() as u64;
    if !matches!(data.last(), Some(b'\n') | Some(b'\r')) {
        lines += 1;
    }
    lines.saturating_sub(1)
}
