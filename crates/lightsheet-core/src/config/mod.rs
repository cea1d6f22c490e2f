mod document;
mod paths;
mod scheduler;
mod stage;

pub use document::{
    BdvConfig, DeconFirstConfig, PipelineConfig, RawConfig, RawDeconFirst, RawPaths,
};
pub use paths::{FlatfieldPaths, PsfPaths, RawFlatfieldPaths, RawPsfPaths};
pub use scheduler::SchedulerConfig;
pub use stage::{OptionValue, RawOptions, StageConfig, StageKind, StageOption};
