mod orchestrator;
mod types;

pub use orchestrator::{plan_acquisition, run_pipeline, run_pipeline_reported, PlannedAcquisition};
pub use types::{AcquisitionSummary, ProgressReporter, RunOptions, RunReport, RunStage};
