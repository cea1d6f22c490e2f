mod plan;
mod psf;
mod stage;

pub use plan::{
    skewed_psf_path, CallArg, FilePlan, Invocation, Plan, Planner, PsfPreskew, SlotSteps,
    StageCall,
};
pub use psf::{psf_settings_path, psf_z_step, PsfCatalog, PsfEntry};
pub use stage::{ProjectionSource, Stage};
