//! Progress events: mapping scan milestones onto the wire format, the
//! bounded scan queue, and paced delivery to the client.
//!
//! The scan runs on a blocking thread and only pushes [`ScanMessage`]s into
//! a bounded queue. A forwarder task drains that queue in arrival order and
//! hands each event to the [`Outbound`] side, which enforces the minimum
//! interval between frames by waiting, never by dropping.

use crate::core::scanner::{ProgressSink, ScanUpdate};
use crate::domain::model::{
    round2, EventStatus, FileFormat, Phase, ProgressEvent, ScanSnapshot,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const STRUCTURE_READING: f64 = 0.1;
pub const STRUCTURE_LOADED: f64 = 0.2;
pub const SCAN_START: f64 = 0.3;
pub const SCAN_END: f64 = 0.85;
pub const READY: f64 = 0.9;

#[derive(Debug)]
pub enum ScanMessage {
    Event(ProgressEvent),
    EndOfScan,
}

pub fn scan_queue(capacity: usize) -> (mpsc::Sender<ScanMessage>, mpsc::Receiver<ScanMessage>) {
    mpsc::channel(capacity.max(1))
}

/// Running view of everything the client has been told so far.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    last_progress: f64,
    counters: ScanSnapshot,
    file_id: Option<i64>,
    file_reference: Option<String>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_identifiers(&mut self, file_id: i64, file_reference: impl Into<String>) {
        self.file_id = Some(file_id);
        self.file_reference = Some(file_reference.into());
    }

    pub fn record(&mut self, snapshot: &ScanSnapshot) {
        self.counters.null_count = snapshot.null_count;
        self.counters.processed_count = snapshot.processed_count;
        self.counters.duplicate_records = snapshot.duplicate_records.clone();
        if snapshot.total_rows.is_some() {
            self.counters.total_rows = snapshot.total_rows;
        }
        if snapshot.total_columns.is_some() {
            self.counters.total_columns = snapshot.total_columns;
        }
    }

    pub fn counters(&self) -> &ScanSnapshot {
        &self.counters
    }

    pub fn last_progress(&self) -> f64 {
        self.last_progress
    }

    /// Builds an event; progress is clamped to [0, 1], rounded and never
    /// allowed to fall below what was already reported.
    pub fn event(
        &mut self,
        status: EventStatus,
        phase: Phase,
        progress: f64,
        message: impl Into<String>,
    ) -> ProgressEvent {
        let progress = round2(progress.clamp(0.0, 1.0)).max(self.last_progress);
        self.last_progress = progress;

        ProgressEvent {
            phase,
            status,
            progress,
            message: message.into(),
            null_count: self.counters.null_count,
            processed_count: self.counters.processed_count,
            total_rows: self.counters.total_rows,
            total_columns: self.counters.total_columns,
            duplicate_records: self.counters.duplicate_records.clone(),
            file_id: self.file_id,
            file_reference: self.file_reference.clone(),
            original_filename: None,
            stored_filename: None,
            file_size: None,
            file_path: None,
            time_consumption: None,
        }
    }

    /// Terminal error event carrying the best-known counters.
    pub fn error_event(&mut self, message: impl Into<String>) -> ProgressEvent {
        let progress = self.last_progress;
        self.event(EventStatus::Error, Phase::Failed, progress, message)
    }
}

/// Translates a scan milestone into the event the client sees.
pub fn describe_update(
    tracker: &mut ProgressTracker,
    format: FileFormat,
    update: &ScanUpdate,
) -> ProgressEvent {
    let name = format.display_name();
    let analyzing = EventStatus::Analyzing;

    match update {
        ScanUpdate::StructureReading => tracker.event(
            analyzing,
            Phase::StructureRead,
            STRUCTURE_READING,
            format!("Reading and parsing {} file structure...", name),
        ),
        ScanUpdate::StructureLoaded {
            estimated_rows,
            total_columns,
        } => {
            tracker.record(&ScanSnapshot {
                total_rows: *estimated_rows,
                total_columns: Some(*total_columns),
                ..ScanSnapshot::default()
            });
            let message = match estimated_rows {
                Some(rows) => format!(
                    "{} file structure loaded. Beginning comprehensive chunked analysis of {} rows...",
                    name,
                    group_thousands(*rows)
                ),
                None => format!(
                    "{} file structure loaded. Beginning comprehensive chunked analysis...",
                    name
                ),
            };
            tracker.event(analyzing, Phase::StructureRead, STRUCTURE_LOADED, message)
        }
        ScanUpdate::ScanStarted(snapshot) => {
            tracker.record(snapshot);
            let columns = snapshot.total_columns.unwrap_or(0);
            tracker.event(
                analyzing,
                Phase::Scanning,
                SCAN_START,
                format!(
                    "Scanning dataset for missing values across {} columns...",
                    columns
                ),
            )
        }
        ScanUpdate::ChunkScanned {
            chunk_number,
            expected_chunks,
            snapshot,
        } => {
            tracker.record(snapshot);
            let total = snapshot
                .total_rows
                .map(group_thousands)
                .unwrap_or_else(|| "?".to_string());
            tracker.event(
                analyzing,
                Phase::Scanning,
                chunk_progress(*chunk_number, *expected_chunks),
                format!(
                    "Processing chunk {} of {} ({} of {} rows processed). Found {} rows with null/undefined values so far...",
                    chunk_number,
                    expected_chunks,
                    group_thousands(snapshot.processed_count),
                    total,
                    group_thousands(snapshot.null_count)
                ),
            )
        }
        ScanUpdate::Finalizing(snapshot) => {
            tracker.record(snapshot);
            tracker.event(
                analyzing,
                Phase::Finalizing,
                SCAN_END,
                "Performing final duplicate detection analysis across all columns to identify repeated values...",
            )
        }
        ScanUpdate::Ready(snapshot) => {
            tracker.record(snapshot);
            tracker.event(
                analyzing,
                Phase::ReadyForPersistence,
                READY,
                format!(
                    "Data quality analysis completed successfully. Identified {} rows containing null or undefined values. Detected duplicate entries in {} column(s). Generating comprehensive report...",
                    group_thousands(snapshot.null_count),
                    snapshot.duplicate_records.len()
                ),
            )
        }
    }
}

/// Position inside the scanning band after `chunk_number` of `expected_chunks`.
pub fn chunk_progress(chunk_number: usize, expected_chunks: usize) -> f64 {
    if expected_chunks == 0 {
        return SCAN_START;
    }
    let fraction = chunk_number as f64 / expected_chunks as f64;
    (SCAN_START + (SCAN_END - SCAN_START) * fraction).min(SCAN_END)
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Producer half used from inside the blocking scan.
pub struct ScanEmitter {
    tx: mpsc::Sender<ScanMessage>,
    tracker: ProgressTracker,
    format: FileFormat,
    queue_open: bool,
}

impl ScanEmitter {
    pub fn new(tx: mpsc::Sender<ScanMessage>, tracker: ProgressTracker, format: FileFormat) -> Self {
        Self {
            tx,
            tracker,
            format,
            queue_open: true,
        }
    }

    fn push(&mut self, message: ScanMessage) {
        if !self.queue_open {
            return;
        }
        // Blocks while the queue is full.
        if self.tx.blocking_send(message).is_err() {
            tracing::warn!("Progress queue closed; scan continues without progress events");
            self.queue_open = false;
        }
    }

    /// Sends the end-of-scan marker and hands the tracker back.
    pub fn close(mut self) -> ProgressTracker {
        self.push(ScanMessage::EndOfScan);
        self.tracker
    }
}

impl ProgressSink for ScanEmitter {
    fn update(&mut self, update: ScanUpdate) {
        let event = describe_update(&mut self.tracker, self.format, &update);
        self.push(ScanMessage::Event(event));
    }
}

/// Client-facing side of the stream with minimum-interval pacing.
pub struct Outbound {
    tx: mpsc::Sender<ProgressEvent>,
    min_interval: Duration,
    last_sent: Option<Instant>,
    connected: bool,
}

impl Outbound {
    pub fn new(tx: mpsc::Sender<ProgressEvent>, min_interval: Duration) -> Self {
        Self {
            tx,
            min_interval,
            last_sent: None,
            connected: true,
        }
    }

    /// An outbound side whose client is already gone.
    pub fn closed(min_interval: Duration) -> Self {
        let (tx, _) = mpsc::channel(1);
        Self {
            tx,
            min_interval,
            last_sent: None,
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Delivers `event`, first waiting out the pacing interval. After the
    /// client goes away events are discarded without delay.
    pub async fn forward(&mut self, event: ProgressEvent) {
        if !self.connected {
            return;
        }

        if let Some(last) = self.last_sent {
            tokio::time::sleep_until(last + self.min_interval).await;
        }

        if self.tx.send(event).await.is_err() {
            tracing::info!("Client disconnected; processing continues without streaming");
            self.connected = false;
            return;
        }
        self.last_sent = Some(Instant::now());
    }
}

/// Drains the scan queue in arrival order until the end-of-scan marker (or
/// until every producer is gone), then returns the outbound side.
pub fn spawn_forwarder(
    mut rx: mpsc::Receiver<ScanMessage>,
    mut outbound: Outbound,
) -> JoinHandle<Outbound> {
    tokio::spawn(async move {
        let mut forwarded = 0usize;
        while let Some(message) = rx.recv().await {
            match message {
                ScanMessage::Event(event) => {
                    outbound.forward(event).await;
                    forwarded += 1;
                }
                ScanMessage::EndOfScan => break,
            }
        }
        tracing::debug!("Forwarder finished after {} scan events", forwarded);
        outbound
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn snapshot(processed: u64) -> ScanSnapshot {
        ScanSnapshot {
            null_count: 1,
            processed_count: processed,
            total_rows: Some(1_000_000),
            total_columns: Some(3),
            duplicate_records: BTreeMap::from([("a".to_string(), 2)]),
        }
    }

    #[test]
    fn test_chunk_progress_band() {
        assert_eq!(chunk_progress(0, 0), SCAN_START);
        assert!((chunk_progress(5, 10) - 0.575).abs() < 1e-9);
        assert_eq!(chunk_progress(10, 10), SCAN_END);
        assert_eq!(chunk_progress(12, 10), SCAN_END);
    }

    #[test]
    fn test_ten_chunks_give_strictly_increasing_progress() {
        let mut tracker = ProgressTracker::new();
        let mut last = 0.0;
        for chunk in 1..=10 {
            let event = describe_update(
                &mut tracker,
                FileFormat::Delimited,
                &ScanUpdate::ChunkScanned {
                    chunk_number: chunk,
                    expected_chunks: 10,
                    snapshot: snapshot(chunk as u64 * 100_000),
                },
            );
            assert_eq!(event.status, EventStatus::Analyzing);
            assert!(event.progress > last, "chunk {chunk}: {}", event.progress);
            last = event.progress;
        }
        assert_eq!(last, 0.85);
    }

    #[test]
    fn test_carriage_return_file_progress_advances_per_chunk() {
        use crate::core::scanner::scan_source;
        use crate::domain::model::SourceFile;

        let mut text = String::from("id,value");
        for i in 0..1000 {
            text.push_str(&format!("\r{},v{}", i, i));
        }
        let source = SourceFile::new(text.into_bytes(), FileFormat::Delimited);
        let mut updates = Vec::new();
        scan_source(&source, 100, &mut updates).unwrap();

        let mut tracker = ProgressTracker::new();
        let events: Vec<ProgressEvent> = updates
            .iter()
            .filter(|u| matches!(u, ScanUpdate::ChunkScanned { .. }))
            .map(|u| describe_update(&mut tracker, FileFormat::Delimited, u))
            .collect();

        assert_eq!(events.len(), 10);
        for pair in events.windows(2) {
            assert!(pair[1].progress > pair[0].progress, "{} then {}", pair[0].progress, pair[1].progress);
        }
        for event in &events {
            assert!(event.total_rows.unwrap() >= event.processed_count);
        }
        assert_eq!(events[9].progress, 0.85);
    }

    #[test]
    fn test_tracker_never_goes_backwards() {
        let mut tracker = ProgressTracker::new();
        let first = tracker.event(EventStatus::Uploading, Phase::UploadComplete, 0.5, "a");
        let second = tracker.event(EventStatus::Analyzing, Phase::StructureRead, 0.1, "b");
        assert_eq!(first.progress, 0.5);
        assert_eq!(second.progress, 0.5);
        let err = tracker.error_event("boom");
        assert_eq!(err.progress, 0.5);
        assert_eq!(err.status, EventStatus::Error);
    }

    #[test]
    fn test_events_carry_identifiers_and_counters() {
        let mut tracker = ProgressTracker::new();
        tracker.set_identifiers(42, "ref-42");
        let event = describe_update(
            &mut tracker,
            FileFormat::Records,
            &ScanUpdate::Ready(snapshot(1_000_000)),
        );
        assert_eq!(event.file_id, Some(42));
        assert_eq!(event.file_reference.as_deref(), Some("ref-42"));
        assert_eq!(event.progress, READY);
        assert_eq!(event.processed_count, 1_000_000);
        assert_eq!(event.duplicate_records["a"], 2);
        assert!(event.message.contains("1 column(s)"));
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }

    #[tokio::test]
    async fn test_forwarder_keeps_order_and_stops_at_marker() {
        let (queue_tx, queue_rx) = scan_queue(4);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let handle = spawn_forwarder(queue_rx, Outbound::new(out_tx, Duration::ZERO));

        let producer = tokio::task::spawn_blocking(move || {
            let mut emitter = ScanEmitter::new(queue_tx, ProgressTracker::new(), FileFormat::Delimited);
            for chunk in 1..=10 {
                emitter.update(ScanUpdate::ChunkScanned {
                    chunk_number: chunk,
                    expected_chunks: 10,
                    snapshot: snapshot(chunk as u64),
                });
            }
            emitter.close()
        });

        let tracker = producer.await.unwrap();
        let outbound = handle.await.unwrap();
        drop(outbound);

        let mut processed = Vec::new();
        while let Some(event) = out_rx.recv().await {
            processed.push(event.processed_count);
        }
        assert_eq!(processed, (1..=10).collect::<Vec<u64>>());
        assert_eq!(tracker.last_progress(), SCAN_END);
    }

    #[tokio::test]
    async fn test_outbound_paces_events() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut outbound = Outbound::new(tx, Duration::from_millis(100));
        let mut tracker = ProgressTracker::new();
        let started = std::time::Instant::now();
        for i in 0..3 {
            outbound
                .forward(tracker.event(EventStatus::Uploading, Phase::Validating, 0.01 * i as f64, "x"))
                .await;
        }
        assert!(started.elapsed() >= Duration::from_millis(200));
        drop(outbound);
        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_outbound_survives_disconnect() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut outbound = Outbound::new(tx, Duration::from_secs(5));
        let mut tracker = ProgressTracker::new();
        let started = std::time::Instant::now();
        outbound
            .forward(tracker.event(EventStatus::Uploading, Phase::Validating, 0.0, "a"))
            .await;
        outbound
            .forward(tracker.event(EventStatus::Uploading, Phase::Validating, 0.0, "b"))
            .await;
        assert!(!outbound.is_connected());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
