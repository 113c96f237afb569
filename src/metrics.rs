use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing upload and question activity.
#[derive(Default)]
pub struct ServiceMetrics {
    documents_uploaded: AtomicU64,
    uploads_rejected: AtomicU64,
    questions_answered: AtomicU64,
    questions_failed: AtomicU64,
    indexes_built: AtomicU64,
    index_cache_hits: AtomicU64,
    last_chunk_count: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stored upload.
    pub fn record_upload(&self) {
        self.documents_uploaded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an upload refused by validation or extraction.
    pub fn record_rejected_upload(&self) {
        self.uploads_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successfully answered question.
    pub fn record_answer(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a question that ended in an error.
    pub fn record_failed_question(&self) {
        self.questions_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a freshly built index and its chunk count.
    pub fn record_index_build(&self, chunk_count: u64) {
        self.indexes_built.fetch_add(1, Ordering::Relaxed);
        self.last_chunk_count.store(chunk_count, Ordering::Relaxed);
    }

    /// Record an index served from the cache instead of being rebuilt.
    pub fn record_cache_hit(&self) {
        self.index_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let indexes_built = self.indexes_built.load(Ordering::Relaxed);
        MetricsSnapshot {
            documents_uploaded: self.documents_uploaded.load(Ordering::Relaxed),
            uploads_rejected: self.uploads_rejected.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            questions_failed: self.questions_failed.load(Ordering::Relaxed),
            indexes_built,
            index_cache_hits: self.index_cache_hits.load(Ordering::Relaxed),
            last_chunk_count: (indexes_built > 0)
                .then(|| self.last_chunk_count.load(Ordering::Relaxed)),
        }
    }
}

/// Immutable view of service counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents stored since startup.
    pub documents_uploaded: u64,
    /// Uploads refused by validation or extraction.
    pub uploads_rejected: u64,
    /// Questions answered successfully.
    pub questions_answered: u64,
    /// Questions that ended in an error.
    pub questions_failed: u64,
    /// Indexes built from document text.
    pub indexes_built: u64,
    /// Indexes reused from the cache.
    pub index_cache_hits: u64,
    /// Chunk count of the most recently built index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chunk_count: Option<u64>,
}
