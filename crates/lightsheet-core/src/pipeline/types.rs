use std::path::PathBuf;

use crate::error::LightsheetError;
use crate::wait::RetryPolicy;

/// Run phase, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStage {
    Cataloguing,
    Discovering,
    Processing,
    Persisting,
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cataloguing => write!(f, "Reading PSF metadata"),
            Self::Discovering => write!(f, "Discovering acquisitions"),
            Self::Processing => write!(f, "Processing acquisitions"),
            Self::Persisting => write!(f, "Writing ledger"),
        }
    }
}

/// Thread-safe progress reporting for a run.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new phase has started. `total_items` is the number of
    /// acquisitions in this phase, if known.
    fn begin_stage(&self, _stage: RunStage, _total_items: Option<usize>) {}

    /// One acquisition within the current phase has been handled.
    fn advance(&self, _items_done: usize) {}

    /// The current phase is finished.
    fn finish_stage(&self) {}
}

/// No-op progress reporter, used when `run_pipeline` delegates.
pub(super) struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

#[derive(Clone, Copy, Debug, Default)]
pub struct RunOptions {
    /// Plan and render commands without touching the filesystem, the
    /// scheduler or the ledger.
    pub dry_run: bool,
    /// How long to wait for pre-skewed PSFs.
    pub wait: RetryPolicy,
}

/// Outcome of one acquisition that was planned and submitted.
#[derive(Clone, Debug)]
pub struct AcquisitionSummary {
    pub dir: PathBuf,
    pub files: usize,
    pub stages: usize,
    /// Submission commands in the order they were (or would be) issued.
    pub commands: Vec<String>,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub processed: Vec<AcquisitionSummary>,
    /// Acquisitions with no image files for their prefix.
    pub empty: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, LightsheetError)>,
    pub dry_run: bool,
}

impl RunReport {
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.processed
            .iter()
            .flat_map(|a| a.commands.iter().map(String::as_str))
    }

    pub fn job_count(&self) -> usize {
        self.processed.iter().map(|a| a.commands.len()).sum()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}
