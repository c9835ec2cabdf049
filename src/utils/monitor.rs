use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
#[cfg(feature = "monitor")]
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Reads the resident memory of the current process.
#[cfg(feature = "monitor")]
pub struct MemorySampler {
    system: System,
    pid: Option<Pid>,
}

#[cfg(feature = "monitor")]
impl MemorySampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!("Memory sampling unavailable: {}", e);
                None
            }
        };

        Self {
            system: System::new(),
            pid,
        }
    }

    /// Resident set size in bytes, or 0 when the host cannot report it.
    pub fn sample_bytes(&mut self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );

        self.system
            .process(pid)
            .map(|process| process.memory())
            .unwrap_or(0)
    }
}

// Builds without sysinfo report zero instead of failing the scan.
#[cfg(not(feature = "monitor"))]
pub struct MemorySampler;

#[cfg(not(feature = "monitor"))]
impl MemorySampler {
    pub fn new() -> Self {
        Self
    }

    pub fn sample_bytes(&mut self) -> u64 {
        0
    }
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Background sampler tracking peak resident memory while a scan runs.
///
/// The sampling task is the only writer of the peak value; `stop` joins it,
/// takes one last synchronous sample and folds it in.
pub struct MemoryMonitor {
    peak_bytes: Arc<AtomicU64>,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<MemorySampler>,
    started_at: Instant,
}

impl MemoryMonitor {
    pub fn start(interval: Duration) -> Self {
        let peak_bytes = Arc::new(AtomicU64::new(0));
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let task_peak = Arc::clone(&peak_bytes);

        let handle = tokio::spawn(async move {
            let mut sampler = MemorySampler::new();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let current = sampler.sample_bytes();
                        task_peak.fetch_max(current, Ordering::Relaxed);
                    }
                }
            }

            sampler
        });

        Self {
            peak_bytes,
            stop_tx: Some(stop_tx),
            handle,
            started_at: Instant::now(),
        }
    }

    /// Peak observed so far, in megabytes.
    pub fn peak_mb(&self) -> f64 {
        self.peak_bytes.load(Ordering::Relaxed) as f64 / BYTES_PER_MB
    }

    /// Stops sampling and returns the peak resident memory in megabytes.
    pub async fn stop(mut self) -> f64 {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        let mut sampler = match (&mut self.handle).await {
            Ok(sampler) => sampler,
            Err(e) => {
                tracing::warn!("Memory monitor task ended abnormally: {}", e);
                MemorySampler::new()
            }
        };

        let final_sample = sampler.sample_bytes();
        self.peak_bytes.fetch_max(final_sample, Ordering::Relaxed);

        let peak = self.peak_mb();
        tracing::info!(
            "📊 Memory monitor stopped - Peak: {:.2}MB, Time: {:?}",
            peak,
            self.started_at.elapsed()
        );
        peak
    }
}

impl Drop for MemoryMonitor {
    fn drop(&mut self) {
        if self.stop_tx.is_some() {
            self.handle.abort();
        }
    }
}
