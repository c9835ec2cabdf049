//! Format-agnostic view over an uploaded table.
//!
//! Each supported format yields its column list, a row-count estimate and a
//! row iterator; [`Chunks`] groups any of those row iterators into ordered,
//! bounded batches so the scanner never sees format details.

use crate::core::delimited::DelimitedAdapter;
use crate::core::records::RecordsAdapter;
use crate::core::spreadsheet::SpreadsheetAdapter;
use crate::domain::model::{Chunk, FileFormat, Row, SourceFile};
use crate::utils::error::Result;
use std::collections::HashSet;
use std::sync::Arc;

pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

pub type RowIter<'a> = Box<dyn Iterator<Item = Result<Row>> + 'a>;

pub enum FormatAdapter {
    Delimited(DelimitedAdapter),
    Spreadsheet(SpreadsheetAdapter),
    Records(RecordsAdapter),
}

impl FormatAdapter {
    /// Reads the structure of `source`: header row, row estimate and, for
    /// formats that cannot be streamed, the parsed document.
    pub fn open(source: &SourceFile) -> Result<Self> {
        let data = Arc::clone(source.data());
        let adapter = match source.format() {
            FileFormat::Delimited => Self::Delimited(DelimitedAdapter::open(data)?),
            FileFormat::Spreadsheet => Self::Spreadsheet(SpreadsheetAdapter::open(data)?),
            FileFormat::Records => Self::Records(RecordsAdapter::open(&data)?),
        };
        tracing::debug!(
            "Opened {} source with {} columns (estimated rows: {:?})",
            adapter.format().display_name(),
            adapter.columns().len(),
            adapter.estimate_rows()
        );
        Ok(adapter)
    }

    pub fn format(&self) -> FileFormat {
        match self {
            Self::Delimited(_) => FileFormat::Delimited,
            Self::Spreadsheet(_) => FileFormat::Spreadsheet,
            Self::Records(_) => FileFormat::Records,
        }
    }

    pub fn columns(&self) -> &[String] {
        match self {
            Self::Delimited(adapter) => adapter.columns(),
            Self::Spreadsheet(adapter) => adapter.columns(),
            Self::Records(adapter) => adapter.columns(),
        }
    }

    pub fn estimate_rows(&self) -> Option<u64> {
        match self {
            Self::Delimited(adapter) => adapter.estimate_rows(),
            Self::Spreadsheet(adapter) => adapter.estimate_rows(),
            Self::Records(adapter) => adapter.estimate_rows(),
        }
    }

    /// Starts a fresh pass over the rows. May be called any number of times.
    pub fn chunks(&self, chunk_size: usize) -> Chunks<'_> {
        let rows: RowIter<'_> = match self {
            Self::Delimited(adapter) => adapter.rows(),
            Self::Spreadsheet(adapter) => adapter.rows(),
            Self::Records(adapter) => adapter.rows(),
        };
        Chunks::new(rows, chunk_size)
    }
}

/// Groups rows into chunks of at most `chunk_size`, in file order.
pub struct Chunks<'a> {
    rows: RowIter<'a>,
    chunk_size: usize,
    next_index: usize,
    done: bool,
}

impl<'a> Chunks<'a> {
    pub fn new(rows: RowIter<'a>, chunk_size: usize) -> Self {
        Self {
            rows,
            chunk_size: chunk_size.max(1),
            next_index: 0,
            done: false,
        }
    }
}

impl Iterator for Chunks<'_> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut rows = Vec::with_capacity(self.chunk_size.min(4096));
        while rows.len() < self.chunk_size {
            match self.rows.next() {
                Some(Ok(row)) => rows.push(row),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if rows.is_empty() {
            return None;
        }

        let chunk = Chunk {
            index: self.next_index,
            rows,
        };
        self.next_index += 1;
        Some(Ok(chunk))
    }
}

/// Makes header names usable as column keys: blank names become
/// `Unnamed: <position>` and repeats get `.1`, `.2`, ... suffixes.
pub fn normalize_headers<I>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    let mut columns = Vec::new();

    for (position, name) in raw.into_iter().enumerate() {
        let base = if name.trim().is_empty() {
            format!("Unnamed: {}", position)
        } else {
            name
        };

        let mut candidate = base.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}.{}", base, suffix);
            suffix += 1;
        }

        seen.insert(candidate.clone());
        columns.push(candidate);
    }

    columns
}
