use crate::core::source::FormatAdapter;
use crate::domain::model::{AnalysisResult, Chunk, DuplicateCounts, ScanSnapshot, SourceFile};
use crate::utils::error::ScanError;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Cell texts treated as missing, compared after trimming, case-insensitively.
pub const NULL_TOKENS: [&str; 5] = ["null", "none", "undefined", "nan", ""];

pub fn is_null_token(trimmed: &str) -> bool {
    NULL_TOKENS
        .iter()
        .any(|token| trimmed.eq_ignore_ascii_case(token))
}

/// Milestones reported by a scan, in the order they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanUpdate {
    StructureReading,
    StructureLoaded {
        estimated_rows: Option<u64>,
        total_columns: usize,
    },
    ScanStarted(ScanSnapshot),
    ChunkScanned {
        chunk_number: usize,
        expected_chunks: usize,
        snapshot: ScanSnapshot,
    },
    Finalizing(ScanSnapshot),
    Ready(ScanSnapshot),
}

/// Receiver of scan milestones. The scanner only pushes; pacing and
/// delivery are the sink's business.
pub trait ProgressSink {
    fn update(&mut self, update: ScanUpdate);
}

impl ProgressSink for Vec<ScanUpdate> {
    fn update(&mut self, update: ScanUpdate) {
        self.push(update);
    }
}

/// Accumulator owned by a single scan run. Counters and seen-sets only grow.
#[derive(Debug)]
pub struct ScanState {
    columns: Vec<String>,
    null_row_count: u64,
    processed_row_count: u64,
    total_rows: Option<u64>,
    seen: Vec<HashSet<String>>,
    duplicates: Vec<u64>,
}

impl ScanState {
    pub fn new(columns: Vec<String>, estimated_rows: Option<u64>) -> Self {
        let width = columns.len();
        Self {
            columns,
            null_row_count: 0,
            processed_row_count: 0,
            total_rows: estimated_rows,
            seen: vec![HashSet::new(); width],
            duplicates: vec![0; width],
        }
    }

    /// Folds one chunk into the counters. Chunks must arrive in file order.
    pub fn absorb(&mut self, chunk: Chunk) {
        let width = self.columns.len();
        let rows = chunk.rows.len() as u64;

        for row in chunk.rows {
            let mut has_null = row.len() < width;

            for (column, cell) in row.into_iter().enumerate().take(width) {
                let Some(value) = cell else {
                    has_null = true;
                    continue;
                };

                let trimmed = value.trim();
                if is_null_token(trimmed) {
                    has_null = true;
                    continue;
                }

                let seen = &mut self.seen[column];
                if seen.contains(trimmed) {
                    self.duplicates[column] += 1;
                } else {
                    let untouched = trimmed.len() == value.len();
                    let key = if untouched {
                        value
                    } else {
                        value.trim().to_string()
                    };
                    seen.insert(key);
                }
            }

            if has_null {
                self.null_row_count += 1;
            }
        }

        self.processed_row_count += rows;
    }

    /// Replaces the row estimate with the counted total.
    pub fn finish(&mut self) {
        self.total_rows = Some(self.processed_row_count);
    }

    pub fn null_count(&self) -> u64 {
        self.null_row_count
    }

    pub fn processed_count(&self) -> u64 {
        self.processed_row_count
    }

    pub fn total_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn duplicate_records(&self) -> DuplicateCounts {
        self.columns
            .iter()
            .zip(&self.duplicates)
            .filter(|(_, count)| **count > 0)
            .map(|(column, count)| (column.clone(), *count))
            .collect()
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            null_count: self.null_row_count,
            processed_count: self.processed_row_count,
            // An estimate that ran short never reports fewer rows than were read.
            total_rows: self
                .total_rows
                .map(|total| total.max(self.processed_row_count)),
            total_columns: Some(self.columns.len()),
            duplicate_records: self.duplicate_records(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanSummary {
    pub null_count: u64,
    pub total_rows: u64,
    pub total_columns: usize,
    pub duplicate_records: DuplicateCounts,
    pub elapsed: Duration,
}

impl ScanSummary {
    pub fn into_result(self, duration: Duration, peak_memory_mb: f64) -> AnalysisResult {
        AnalysisResult {
            null_count: self.null_count,
            total_rows: self.total_rows,
            total_columns: self.total_columns,
            duplicate_records: self.duplicate_records,
            duration,
            peak_memory_mb,
        }
    }
}

/// A failed scan together with the counters reached before the failure.
#[derive(Debug)]
pub struct ScanFailure {
    pub error: ScanError,
    pub partial: ScanSnapshot,
}

impl ScanFailure {
    fn new(error: ScanError, partial: ScanSnapshot) -> Self {
        Self { error, partial }
    }
}

/// Runs the chunked null/duplicate scan over `source`.
///
/// Results do not depend on `chunk_size`; it only bounds how many rows are
/// materialised at once. Blocking: call from a blocking-capable thread.
pub fn scan_source(
    source: &SourceFile,
    chunk_size: usize,
    sink: &mut dyn ProgressSink,
) -> Result<ScanSummary, ScanFailure> {
    let started = Instant::now();
    tracing::info!(
        "Starting chunked {} analysis ({} bytes, chunk size {})",
        source.format().display_name(),
        source.size(),
        chunk_size
    );

    sink.update(ScanUpdate::StructureReading);

    let adapter =
        FormatAdapter::open(source).map_err(|e| ScanFailure::new(e, ScanSnapshot::default()))?;
    let estimated_rows = adapter.estimate_rows();
    let columns = adapter.columns().to_vec();

    sink.update(ScanUpdate::StructureLoaded {
        estimated_rows,
        total_columns: columns.len(),
    });

    let mut state = ScanState::new(columns, estimated_rows);
    sink.update(ScanUpdate::ScanStarted(state.snapshot()));

    let chunk_size = chunk_size.max(1);
    let estimated_chunks = estimated_rows
        .map(|rows| rows.div_ceil(chunk_size as u64) as usize)
        .unwrap_or(0);

    for chunk in adapter.chunks(chunk_size) {
        let chunk = chunk.map_err(|e| ScanFailure::new(e, state.snapshot()))?;
        let chunk_number = chunk.index + 1;
        let rows = chunk.len();

        state.absorb(chunk);

        tracing::debug!(
            "Chunk {} scanned ({} rows, {} processed, {} null rows)",
            chunk_number,
            rows,
            state.processed_count(),
            state.null_count()
        );

        sink.update(ScanUpdate::ChunkScanned {
            chunk_number,
            expected_chunks: estimated_chunks.max(chunk_number),
            snapshot: state.snapshot(),
        });
    }

    if state.processed_count() == 0 {
        return Err(ScanFailure::new(ScanError::EmptyFileError, state.snapshot()));
    }

    state.finish();
    sink.update(ScanUpdate::Finalizing(state.snapshot()));

    let summary = ScanSummary {
        null_count: state.null_count(),
        total_rows: state.processed_count(),
        total_columns: state.total_columns(),
        duplicate_records: state.duplicate_records(),
        elapsed: started.elapsed(),
    };

    sink.update(ScanUpdate::Ready(state.snapshot()));

    tracing::info!(
        "Chunked analysis complete: {} null rows, {} total rows, {} columns, {} columns with duplicates ({:?})",
        summary.null_count,
        summary.total_rows,
        summary.total_columns,
        summary.duplicate_records.len(),
        summary.elapsed
    );

    Ok(summary)
}
