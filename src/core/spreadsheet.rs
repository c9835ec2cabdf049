use crate::core::source::{normalize_headers, RowIter};
use crate::domain::model::Row;
use crate::utils::error::{Result, ScanError};
use calamine::{Data, Range, Reader, Xlsx};
use std::io::Cursor;
use std::sync::Arc;

/// First worksheet of an OOXML workbook. The sheet has to be parsed as a
/// whole, so the row count is exact; cells are only turned into strings one
/// chunk at a time.
pub struct SpreadsheetAdapter {
    range: Range<Data>,
    columns: Vec<String>,
}

impl SpreadsheetAdapter {
    pub fn open(data: Arc<[u8]>) -> Result<Self> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(data))
            .map_err(|e| ScanError::parse(format!("Failed to open workbook: {}", e)))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ScanError::parse("No worksheet found in workbook"))?
            .map_err(|e| ScanError::parse(format!("Failed to read worksheet: {}", e)))?;

        let mut rows = range.rows();
        let header = rows.next().ok_or(ScanError::EmptyFileError)?;
        if rows.next().is_none() {
            return Err(ScanError::EmptyFileError);
        }

        let columns = normalize_headers(
            header
                .iter()
                .map(|cell| cell_text(cell).unwrap_or_default()),
        );

        Ok(Self { range, columns })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn estimate_rows(&self) -> Option<u64> {
        Some(self.range.height().saturating_sub(1) as u64)
    }

    pub fn rows(&self) -> RowIter<'_> {
        Box::new(
            self.range
                .rows()
                .skip(1)
                .map(|cells| Ok(cells.iter().map(cell_text).collect::<Row>())),
        )
    }
}

/// Text of a cell; empty and error cells count as absent.
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
            Some(format!("{}", *f as i64))
        }
        Data::Float(f) => Some(f.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
