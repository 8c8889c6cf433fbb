use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use agentflow_core::JobId;

/// Where progress reports end up (the job context store, in practice).
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn record(&self, job_id: JobId, progress: u8);
}

/// Discards reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

#[async_trait]
impl ProgressSink for NoopProgress {
    async fn record(&self, _job_id: JobId, _progress: u8) {}
}

/// Progress handle given to a running agent.
///
/// Values are clamped to 0..=100 and never go backwards; a report lower than
/// or equal to the last one is dropped without touching the sink.
#[derive(Clone)]
pub struct ProgressReporter {
    job_id: JobId,
    last: Arc<AtomicU8>,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressReporter {
    pub fn new(job_id: JobId, starting_at: u8, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            job_id,
            last: Arc::new(AtomicU8::new(starting_at.min(100))),
            sink,
        }
    }

    pub fn noop(job_id: JobId) -> Self {
        Self::new(job_id, 0, Arc::new(NoopProgress))
    }

    pub fn current(&self) -> u8 {
        self.last.load(Ordering::Acquire)
    }

    pub async fn report(&self, progress: u8) {
        let progress = progress.min(100);
        let previous = self.last.fetch_max(progress, Ordering::AcqRel);
        if progress > previous {
            self.sink.record(self.job_id, progress).await;
        }
    }
}

impl core::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("job_id", &self.job_id)
            .field("last", &self.current())
            .finish_non_exhaustive()
    }
}
