use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity since process start.
#[derive(Default)]
pub struct PipelineMetrics {
    jobs_finished: AtomicU64,
    jobs_failed: AtomicU64,
    chunks_indexed: AtomicU64,
    vectors_stored: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a job that reached `finished` with the given chunk and vector counts.
    pub fn record_finished(&self, chunk_count: u64, vector_count: u64) {
        self.jobs_finished.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed
            .fetch_add(chunk_count, Ordering::Relaxed);
        self.vectors_stored
            .fetch_add(vector_count, Ordering::Relaxed);
    }

    /// Record a job that reached `failed`.
    pub fn record_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_finished: self.jobs_finished.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            vectors_stored: self.vectors_stored.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Jobs that completed successfully.
    pub jobs_finished: u64,
    /// Jobs that ended in `failed`.
    pub jobs_failed: u64,
    /// Total chunks produced across finished jobs.
    pub chunks_indexed: u64,
    /// Total vectors upserted across finished jobs.
    pub vectors_stored: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_finished_and_failed_jobs() {
        let metrics = PipelineMetrics::new();
        metrics.record_finished(2, 2);
        metrics.record_finished(3, 1);
        metrics.record_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_finished, 2);
        assert_eq!(snapshot.jobs_failed, 1);
        assert_eq!(snapshot.chunks_indexed, 5);
        assert_eq!(snapshot.vectors_stored, 3);
    }

    #[test]
    fn snapshot_starts_empty() {
        assert_eq!(PipelineMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}
