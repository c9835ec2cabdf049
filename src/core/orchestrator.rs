//! Upload pipeline: validation, byte and metadata persistence, the chunked
//! scan and result persistence, sequenced as one state machine whose
//! progress reaches the client as a single ordered event stream.

use crate::config::ScanConfig;
use crate::core::emitter::{scan_queue, spawn_forwarder, Outbound, ProgressTracker, ScanEmitter};
use crate::core::scanner::{scan_source, ScanFailure, ScanSummary};
use crate::domain::model::{
    round2, AnalysisReport, EventStatus, FileFormat, FilePage, FileQuery, FileRecord,
    NewFileRecord, Phase, ProgressEvent, SourceFile,
};
use crate::domain::ports::{ByteStore, MetadataStore};
use crate::utils::error::{Result, ScanError};
use crate::utils::monitor::MemoryMonitor;
use crate::utils::validation::{validate_file_size, validate_upload_filename, Validate};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Where a run currently is, or where it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Validating,
    PersistingBytes,
    PersistingMetadata,
    Scanning,
    PersistingResults,
    Completed,
    Error,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// An incoming file: declared name, declared content type and a byte reader.
pub struct Upload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl Upload {
    pub fn new(filename: Option<String>, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            filename,
            content_type: None,
            reader: Box::new(reader),
        }
    }

    pub fn from_bytes(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self::new(Some(filename.into()), std::io::Cursor::new(data))
    }

    /// Opens a local file; `declared_name` defaults to the file's own name.
    pub async fn from_path(path: impl AsRef<Path>, declared_name: Option<String>) -> Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        let filename = declared_name.or_else(|| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
        });
        Ok(Self::new(filename, file))
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Client end of one upload: the ordered events plus the pipeline task.
pub struct UploadStream {
    events: mpsc::Receiver<ProgressEvent>,
    task: JoinHandle<UploadState>,
}

impl UploadStream {
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    pub fn into_parts(self) -> (mpsc::Receiver<ProgressEvent>, JoinHandle<UploadState>) {
        (self.events, self.task)
    }

    /// Collects every event, then waits for the pipeline to finish.
    pub async fn collect(mut self) -> Result<(Vec<ProgressEvent>, UploadState)> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        let state = self.finish().await?;
        Ok((events, state))
    }

    /// Writes each event as one frame, flushing after every frame.
    pub async fn write_frames<W>(mut self, writer: &mut W, framing: Framing) -> Result<UploadState>
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(event) = self.events.recv().await {
            let frame = match framing {
                Framing::Ndjson => event.to_ndjson_frame()?,
                Framing::Sse => event.to_sse_frame()?,
            };
            if let Err(e) = async {
                writer.write_all(frame.as_bytes()).await?;
                writer.flush().await
            }
            .await
            {
                tracing::info!("Stopped writing frames: {}", e);
                // Dropping the receiver lets the pipeline finish unstreamed.
                break;
            }
        }
        self.finish().await
    }

    async fn finish(self) -> Result<UploadState> {
        drop(self.events);
        self.task
            .await
            .map_err(|e| ScanError::analysis(format!("Upload task failed: {}", e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    #[default]
    Ndjson,
    Sse,
}

/// Runs uploads against a byte store and a metadata store.
pub struct UploadOrchestrator<B, M> {
    bytes: Arc<B>,
    metadata: Arc<M>,
    config: Arc<ScanConfig>,
}

impl<B, M> Clone for UploadOrchestrator<B, M> {
    fn clone(&self) -> Self {
        Self {
            bytes: Arc::clone(&self.bytes),
            metadata: Arc::clone(&self.metadata),
            config: Arc::clone(&self.config),
        }
    }
}

/// Per-run bookkeeping: current state, what the client has seen, and the
/// client connection.
struct Run {
    state: UploadState,
    tracker: ProgressTracker,
    outbound: Outbound,
}

impl Run {
    fn enter(&mut self, state: UploadState) {
        debug_assert!(
            !self.state.is_terminal(),
            "no transition out of {:?}",
            self.state
        );
        tracing::debug!("Upload state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    async fn emit(&mut self, phase: Phase, progress: f64, message: &str) {
        let event = self
            .tracker
            .event(EventStatus::Uploading, phase, progress, message);
        self.outbound.forward(event).await;
    }

    async fn fail(&mut self, error: &ScanError) -> UploadState {
        tracing::error!(
            "❌ Upload failed while {:?}: {} (Category: {:?})",
            self.state,
            error,
            error.category()
        );
        let event = self.tracker.error_event(error.user_friendly_message());
        self.outbound.forward(event).await;
        self.enter(UploadState::Error);
        UploadState::Error
    }
}

struct Stored {
    id: i64,
    reference: String,
    original_filename: String,
    stored_filename: String,
    file_path: String,
    source: SourceFile,
}

impl<B, M> UploadOrchestrator<B, M>
where
    B: ByteStore + 'static,
    M: MetadataStore + 'static,
{
    pub fn new(bytes: Arc<B>, metadata: Arc<M>, config: ScanConfig) -> Self {
        Self {
            bytes,
            metadata,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Starts processing `upload` in the background and returns the client
    /// end of its event stream. Dropping the stream does not stop the run.
    pub fn upload_stream(&self, upload: Upload) -> UploadStream {
        let (tx, events) = mpsc::channel(self.config.event_queue_capacity.max(1));
        let outbound = Outbound::new(tx, self.config.update_interval);
        let orchestrator = self.clone();
        let task = tokio::spawn(async move { orchestrator.run(upload, outbound).await });
        UploadStream { events, task }
    }

    /// Drives one upload to a terminal state, forwarding every event to
    /// `outbound` in order.
    pub async fn run(&self, upload: Upload, outbound: Outbound) -> UploadState {
        let started = Instant::now();
        let mut run = Run {
            state: UploadState::Validating,
            tracker: ProgressTracker::new(),
            outbound,
        };

        tracing::info!(
            "📤 Upload started: {}",
            upload.filename.as_deref().unwrap_or("<unnamed>")
        );

        let stored = match self.store(upload, &mut run).await {
            Ok(stored) => stored,
            Err(e) => return run.fail(&e).await,
        };

        run.enter(UploadState::Scanning);
        let monitor = MemoryMonitor::start(self.config.memory_sample_interval);
        let scan_result = self.scan(&stored, &mut run).await;
        let scan_duration = started.elapsed();
        let peak_memory_mb = monitor.stop().await;

        let summary = match scan_result {
            Ok(summary) => summary,
            Err(ScanFailure { error, partial }) => {
                run.tracker.record(&partial);
                return run.fail(&error).await;
            }
        };

        run.enter(UploadState::PersistingResults);
        let result = summary.into_result(scan_duration, peak_memory_mb);
        if let Err(e) = self.metadata.update(stored.id, &result).await {
            tracing::warn!(
                "⚠️ Failed to save analysis results for file {}: {}",
                stored.id,
                e
            );
        }

        let time_consumption = round2(started.elapsed().as_secs_f64());
        let mut event = run.tracker.event(
            EventStatus::Completed,
            Phase::Completed,
            1.0,
            "File upload and data quality analysis completed successfully. Your comprehensive report is ready for review.",
        );
        event.original_filename = Some(stored.original_filename);
        event.stored_filename = Some(stored.stored_filename);
        event.file_size = Some(stored.source.size());
        event.file_path = Some(stored.file_path);
        event.time_consumption = Some(time_consumption);
        run.outbound.forward(event).await;

        run.enter(UploadState::Completed);
        tracing::info!(
            "✅ Upload {} completed in {:.2}s (peak memory {:.2}MB)",
            stored.reference,
            time_consumption,
            peak_memory_mb
        );
        UploadState::Completed
    }

    /// Validation, byte persistence and metadata persistence.
    async fn store(&self, upload: Upload, run: &mut Run) -> Result<Stored> {
        let Upload {
            filename,
            content_type,
            reader,
        } = upload;

        run.emit(
            Phase::Validating,
            0.0,
            "Validating file format and ensuring compatibility...",
        )
        .await;
        let format = validate_upload_filename(filename.as_deref())?;
        let original_filename = filename.unwrap_or_default();

        run.emit(
            Phase::Validating,
            0.02,
            "Reading and processing uploaded file content into memory...",
        )
        .await;
        let max_file_size = self.config.max_file_size;
        let mut data = Vec::new();
        // One byte past the limit is enough to reject oversize input.
        reader
            .take(max_file_size.saturating_add(1))
            .read_to_end(&mut data)
            .await?;

        run.emit(
            Phase::Validating,
            0.04,
            "Validating file size against maximum allowed limits...",
        )
        .await;
        validate_file_size(data.len() as u64, max_file_size)?;

        run.enter(UploadState::PersistingBytes);
        run.emit(
            Phase::PersistingBytes,
            0.05,
            "Generating secure unique identifier for file storage...",
        )
        .await;
        let stored_filename = format!("{}.{}", Uuid::new_v4(), format.extension());
        let reference = Uuid::new_v4().to_string();

        run.emit(
            Phase::PersistingBytes,
            0.06,
            "Writing file to secure storage location on server...",
        )
        .await;
        self.bytes.put(&stored_filename, &data).await?;
        let file_path = self.bytes.location(&stored_filename);
        tracing::info!("💾 Stored {} bytes as {}", data.len(), file_path);

        run.enter(UploadState::PersistingMetadata);
        run.emit(
            Phase::PersistingMetadata,
            0.08,
            "Persisting file metadata and creating database records...",
        )
        .await;
        let record = NewFileRecord {
            file_reference: reference.clone(),
            original_filename: original_filename.clone(),
            stored_filename: stored_filename.clone(),
            file_path: file_path.clone(),
            file_size: data.len() as u64,
            content_type: content_type_for(format, content_type.as_deref()),
        };

        let created = match self.metadata.create(record).await {
            Ok(created) => created,
            Err(e) => {
                if let Err(rollback) = self.bytes.delete(&stored_filename).await {
                    tracing::error!(
                        "Failed to remove {} after metadata failure: {}",
                        stored_filename,
                        rollback
                    );
                }
                return Err(match e {
                    ScanError::PersistenceError { .. } => e,
                    other => ScanError::persistence(other.to_string()),
                });
            }
        };

        run.tracker.set_identifiers(created.id, reference.clone());
        run.emit(
            Phase::UploadComplete,
            0.1,
            "File upload completed successfully. Initiating comprehensive data quality analysis...",
        )
        .await;

        Ok(Stored {
            id: created.id,
            reference,
            original_filename,
            stored_filename,
            file_path,
            source: SourceFile::new(data, format),
        })
    }

    /// Runs the scan on a blocking thread while a forwarder task drains its
    /// events to the client in order.
    async fn scan(
        &self,
        stored: &Stored,
        run: &mut Run,
    ) -> std::result::Result<ScanSummary, ScanFailure> {
        let source = stored.source.clone();
        let format = source.format();
        let chunk_size = self.config.chunk_size;
        let (queue_tx, queue_rx) = scan_queue(self.config.event_queue_capacity);

        let outbound = std::mem::replace(
            &mut run.outbound,
            Outbound::closed(self.config.update_interval),
        );
        let forwarder = spawn_forwarder(queue_rx, outbound);

        let emitter = ScanEmitter::new(queue_tx, run.tracker.clone(), format);
        let scan = tokio::task::spawn_blocking(move || {
            let mut emitter = emitter;
            let result = scan_source(&source, chunk_size, &mut emitter);
            (result, emitter.close())
        });

        let joined = scan.await;

        match forwarder.await {
            Ok(outbound) => run.outbound = outbound,
            Err(e) => tracing::warn!("Progress forwarder ended abnormally: {}", e),
        }

        match joined {
            Ok((result, tracker)) => {
                run.tracker = tracker;
                result
            }
            Err(e) => Err(ScanFailure {
                error: ScanError::analysis(format!("Scan task failed: {}", e)),
                partial: run.tracker.counters().clone(),
            }),
        }
    }

    /// Stored report for `reference`.
    pub async fn report_by_reference(&self, reference: &str) -> Result<AnalysisReport> {
        let record = self
            .metadata
            .get_by_reference(reference)
            .await?
            .ok_or_else(|| ScanError::NotFoundError {
                reference: reference.to_string(),
            })?;
        record.report()
    }

    /// One page of stored files, filtered by original filename.
    pub async fn list_files(&self, query: &FileQuery) -> Result<FilePage> {
        query.validate()?;
        self.metadata.list(query).await
    }

    /// Removes the stored bytes, then the metadata record. A failure to
    /// remove the bytes is logged and the record is deleted regardless.
    pub async fn delete_file(&self, reference: &str) -> Result<FileRecord> {
        let record = self
            .metadata
            .get_by_reference(reference)
            .await?
            .ok_or_else(|| ScanError::NotFoundError {
                reference: reference.to_string(),
            })?;

        if let Err(e) = self.bytes.delete(&record.stored_filename).await {
            tracing::warn!(
                "⚠️ Failed to remove {} from storage: {}",
                record.stored_filename,
                e
            );
        }

        if !self.metadata.delete(record.id).await? {
            return Err(ScanError::NotFoundError {
                reference: reference.to_string(),
            });
        }

        tracing::info!(
            "🗑️ Deleted file {} ({})",
            record.id,
            record.original_filename
        );
        Ok(record)
    }
}

/// Content type recorded for an upload. The extension decides; a differing
/// declared type is only logged.
fn content_type_for(format: FileFormat, declared: Option<&str>) -> String {
    let derived = format.content_type();
    if let Some(declared) = declared.filter(|d| !d.eq_ignore_ascii_case(derived)) {
        tracing::debug!(
            "Declared content type {} differs from {} for .{} upload",
            declared,
            derived,
            format.extension()
        );
    }
    derived.to_string()
}
