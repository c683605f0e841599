//! Observer trait for job stage and per-page events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::config::PipelineConfigBuilder::observer`] to follow a job as it
//! moves through its stages. The pipeline itself keeps no shared job
//! registry; a host that wants to track many jobs keys its own structure by
//! [`crate::process::ProcessingRequest::job_id`] and updates it from these
//! callbacks.
//!
//! # Example
//!
//! ```rust
//! use pagescan::{PipelineConfig, PipelineObserver, PageStatus};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailureCounter(AtomicUsize);
//!
//! impl PipelineObserver for FailureCounter {
//!     fn on_page_complete(&self, _job: &str, _page: usize, status: PageStatus) {
//!         if status.is_error() {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .observer(Arc::new(FailureCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::PageStatus;
use std::fmt;
use std::sync::Arc;

/// Coarse job stages, in the order a document path moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validating,
    Converting,
    Rasterizing,
    ContextPass,
    MainPass,
    Aggregating,
    CleaningUp,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Validating => "validating",
            Stage::Converting => "converting",
            Stage::Rasterizing => "rasterizing",
            Stage::ContextPass => "context-pass",
            Stage::MainPass => "main-pass",
            Stage::Aggregating => "aggregating",
            Stage::CleaningUp => "cleaning-up",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Called by the pipeline as a job progresses.
///
/// Implementations must be `Send + Sync`: page events arrive from
/// concurrently running page tasks. All methods default to no-ops.
pub trait PipelineObserver: Send + Sync {
    /// The job entered `stage`.
    fn on_stage(&self, job_id: &str, stage: Stage) {
        let _ = (job_id, stage);
    }

    /// Pages are known and the main pass is about to start.
    fn on_job_start(&self, job_id: &str, total_pages: usize) {
        let _ = (job_id, total_pages);
    }

    /// A main-pass page settled. Called in completion order, not page order.
    fn on_page_complete(&self, job_id: &str, page_number: usize, status: PageStatus) {
        let _ = (job_id, page_number, status);
    }

    /// Something recoverable went wrong (metadata, rasterizer warnings).
    fn on_warning(&self, job_id: &str, message: &str) {
        let _ = (job_id, message);
    }

    /// Aggregation finished.
    fn on_job_complete(&self, job_id: &str, successful: usize, failed: usize) {
        let _ = (job_id, successful, failed);
    }
}

/// No-op observer, used when none is configured.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type SharedObserver = Arc<dyn PipelineObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        stages: Mutex<Vec<Stage>>,
        pages: Mutex<Vec<(usize, PageStatus)>>,
    }

    impl PipelineObserver for Recording {
        fn on_stage(&self, _job_id: &str, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_page_complete(&self, _job_id: &str, page_number: usize, status: PageStatus) {
            self.pages.lock().unwrap().push((page_number, status));
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_stage("j", Stage::Converting);
        o.on_job_start("j", 3);
        o.on_page_complete("j", 1, PageStatus::Success);
        o.on_warning("j", "pdfinfo exited 1");
        o.on_job_complete("j", 2, 1);
    }

    #[test]
    fn recording_observer_receives_events() {
        let rec = Arc::new(Recording::default());
        let shared: SharedObserver = rec.clone();
        shared.on_stage("j", Stage::Rasterizing);
        shared.on_stage("j", Stage::MainPass);
        shared.on_page_complete("j", 2, PageStatus::ApiError);

        assert_eq!(
            *rec.stages.lock().unwrap(),
            vec![Stage::Rasterizing, Stage::MainPass]
        );
        assert_eq!(*rec.pages.lock().unwrap(), vec![(2, PageStatus::ApiError)]);
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::ContextPass.to_string(), "context-pass");
        assert_eq!(Stage::CleaningUp.as_str(), "cleaning-up");
    }
}
