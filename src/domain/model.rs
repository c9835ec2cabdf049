use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Column name to number of repeat occurrences; only nonzero entries are kept.
pub type DuplicateCounts = BTreeMap<String, u64>;

/// A row aligned positionally with the adapter's column list.
/// `None` marks a structurally absent cell.
pub type Row = Vec<Option<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Delimited,
    Spreadsheet,
    Records,
}

impl FileFormat {
    pub const ALL: [FileFormat; 3] = [
        FileFormat::Delimited,
        FileFormat::Spreadsheet,
        FileFormat::Records,
    ];

    /// Expects a lowercase extension without the leading dot.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "csv" => Some(Self::Delimited),
            "xlsx" => Some(Self::Spreadsheet),
            "json" => Some(Self::Records),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Delimited => "csv",
            Self::Spreadsheet => "xlsx",
            Self::Records => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Delimited => "text/csv",
            Self::Spreadsheet => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            Self::Records => "application/json",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Delimited => "CSV",
            Self::Spreadsheet => "XLSX",
            Self::Records => "JSON",
        }
    }

    pub fn supported_list() -> String {
        let names: Vec<&str> = Self::ALL.iter().map(|f| f.display_name()).collect();
        match names.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{}, and {}", rest.join(", "), last),
            _ => names.join(""),
        }
    }
}

/// Raw bytes of one upload plus its declared format. Immutable once built.
#[derive(Debug, Clone)]
pub struct SourceFile {
    data: Arc<[u8]>,
    format: FileFormat,
}

impl SourceFile {
    pub fn new(data: impl Into<Arc<[u8]>>, format: FileFormat) -> Self {
        Self {
            data: data.into(),
            format,
        }
    }

    /// Reads a file from disk, resolving the format from its extension.
    pub fn open(path: impl AsRef<Path>) -> crate::utils::error::Result<Self> {
        let path = path.as_ref();
        let format = crate::utils::validation::validate_upload_filename(
            path.file_name().and_then(|name| name.to_str()),
        )?;
        let data = std::fs::read(path)?;
        Ok(Self::new(data, format))
    }

    pub fn data(&self) -> &Arc<[u8]> {
        &self.data
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// An ordered batch of rows; `index` counts from zero in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub rows: Vec<Row>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Counters visible to clients at any point of a scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanSnapshot {
    pub null_count: u64,
    pub processed_count: u64,
    pub total_rows: Option<u64>,
    pub total_columns: Option<usize>,
    pub duplicate_records: DuplicateCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub null_count: u64,
    pub total_rows: u64,
    pub total_columns: usize,
    pub duplicate_records: DuplicateCounts,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub peak_memory_mb: f64,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Uploading,
    Analyzing,
    Completed,
    Error,
}

/// Pipeline phase that produced an event. Not part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Validating,
    PersistingBytes,
    PersistingMetadata,
    UploadComplete,
    StructureRead,
    Scanning,
    Finalizing,
    ReadyForPersistence,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(skip)]
    pub phase: Phase,
    pub status: EventStatus,
    pub progress: f64,
    pub message: String,
    pub null_count: u64,
    pub processed_count: u64,
    pub total_rows: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_columns: Option<usize>,
    #[serde(default)]
    pub duplicate_records: DuplicateCounts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_consumption: Option<f64>,
}

impl ProgressEvent {
    /// One newline-delimited JSON frame.
    pub fn to_ndjson_frame(&self) -> serde_json::Result<String> {
        let mut frame = serde_json::to_string(self)?;
        frame.push('\n');
        Ok(frame)
    }

    /// One server-sent-event frame.
    pub fn to_sse_frame(&self) -> serde_json::Result<String> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, EventStatus::Completed | EventStatus::Error)
    }
}

/// Rounds to two decimals, the precision used on the wire.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Metadata of a stored upload before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFileRecord {
    pub file_reference: String,
    pub original_filename: String,
    pub stored_filename: String,
    pub file_path: String,
    pub file_size: u64,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub file_reference: String,
    pub original_filename: String,
    pub stored_filename: String,
    pub file_path: String,
    pub file_size: u64,
    pub content_type: String,
    pub null_count: Option<u64>,
    pub total_rows: Option<u64>,
    pub total_columns: Option<usize>,
    pub duplicate_records: Option<DuplicateCounts>,
    pub analysis_time: Option<f64>,
    pub memory_usage_mb: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn from_new(id: i64, record: NewFileRecord, now: DateTime<Utc>) -> Self {
        Self {
            id,
            file_reference: record.file_reference,
            original_filename: record.original_filename,
            stored_filename: record.stored_filename,
            file_path: record.file_path,
            file_size: record.file_size,
            content_type: record.content_type,
            null_count: None,
            total_rows: None,
            total_columns: None,
            duplicate_records: None,
            analysis_time: None,
            memory_usage_mb: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_analysis(&mut self, result: &AnalysisResult, now: DateTime<Utc>) {
        self.null_count = Some(result.null_count);
        self.total_rows = Some(result.total_rows);
        self.total_columns = Some(result.total_columns);
        self.duplicate_records = Some(result.duplicate_records.clone());
        self.analysis_time = Some(round2(result.duration.as_secs_f64()));
        self.memory_usage_mb = Some(round2(result.peak_memory_mb));
        self.updated_at = now;
    }

    pub fn report(&self) -> crate::utils::error::Result<AnalysisReport> {
        match (
            self.null_count,
            self.total_rows,
            self.total_columns,
            self.analysis_time,
        ) {
            (Some(null_records), Some(total_records), Some(total_columns), Some(time)) => {
                Ok(AnalysisReport {
                    file_id: self.id,
                    original_filename: self.original_filename.clone(),
                    file_size: self.file_size,
                    total_records,
                    total_columns,
                    null_records,
                    duplicate_records: self.duplicate_records.clone().unwrap_or_default(),
                    time_consumption: time,
                    created_at: self.created_at,
                })
            }
            _ => Err(crate::utils::error::ScanError::NotAnalyzedError {
                reference: self.file_reference.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub file_id: i64,
    pub original_filename: String,
    pub file_size: u64,
    pub total_records: u64,
    pub total_columns: usize,
    pub null_records: u64,
    pub duplicate_records: DuplicateCounts,
    pub time_consumption: f64,
    pub created_at: DateTime<Utc>,
}

/// Largest page a file listing may request.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Paging and filename filter for listing stored files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileQuery {
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
}

impl Default for FileQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            search: None,
        }
    }
}

impl FileQuery {
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) as usize * self.limit as usize
    }

    /// Case-insensitive substring match on the original filename. A blank
    /// search matches every record.
    pub fn matches(&self, record: &FileRecord) -> bool {
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => record
                .original_filename
                .to_lowercase()
                .contains(&term.to_lowercase()),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePage {
    pub files: Vec<FileRecord>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl FilePage {
    pub fn new(files: Vec<FileRecord>, total: u64, query: &FileQuery) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            total.div_ceil(u64::from(query.limit.max(1)))
        };
        Self {
            files,
            total,
            page: query.page,
            limit: query.limit,
            total_pages,
        }
    }
}
