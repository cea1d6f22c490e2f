use std::time::Duration;

/// Pixel size of the instrument camera in µm/px, used when no stage sets one.
pub const DEFAULT_XY_RES: f64 = 0.108;

/// Default objective angle for stage-scanned acquisitions, in degrees.
pub const DEFAULT_DESKEW_ANGLE: f64 = 147.55;

/// Background fill applied by the decon-first deskew when none is configured.
pub const DEFAULT_DECON_FIRST_FILL: f64 = 0.0;

/// Output bit depth of the decon-first deskew when none is configured.
pub const DEFAULT_DECON_FIRST_BIT_DEPTH: i64 = 16;

/// Bit depths accepted by every processing executable.
pub const SUPPORTED_BIT_DEPTHS: [i64; 3] = [8, 16, 32];

/// Scheduler submission command.
pub const SCHEDULER_SUBMIT: &str = "bsub";

/// Job name attached to every per-file job.
pub const DEFAULT_JOB_NAME: &str = "lightsheet-pipeline";

/// Scheduler log destination when none is configured.
pub const DEFAULT_JOB_LOG: &str = "/dev/null";

/// Estimated run time in minutes. Long enough to stay off the short queue.
pub const DEFAULT_JOB_ESTIMATE_MIN: i64 = 250;

/// Slots requested per job.
pub const DEFAULT_JOB_SLOTS: i64 = 4;

/// Hard run time limit in minutes, substituted with a warning when absent.
pub const DEFAULT_JOB_LIMIT_MIN: i64 = 8 * 60;

/// Scheduler flags for the short PSF pre-skew job.
pub const PSF_SKEW_JOB_FLAGS: &str = "-n 1 -J psf-skew -o /dev/null -We 1 -W 30";

/// Attempts made while waiting for a pre-skewed PSF to appear.
pub const PSF_SKEW_WAIT_ATTEMPTS: u32 = 3;

/// Delay between attempts while waiting for a pre-skewed PSF.
pub const PSF_SKEW_WAIT_INTERVAL: Duration = Duration::from_secs(30);

/// Suffix inserted before the extension of a pre-skewed PSF.
pub const SKEWED_PSF_TAG: &str = "_skewed";

/// File name suffix identifying an instrument settings dump.
pub const SETTINGS_SUFFIX: &str = "Settings.txt";

/// Name of the idempotency ledger inside the data root.
pub const LEDGER_FILENAME: &str = "processed.json";

/// Name of the parsed settings written next to the raw data.
pub const SETTINGS_JSON_FILENAME: &str = "settings.json";

/// Top-level directory holding all projection outputs.
pub const PROJECTION_DIR: &str = "mip";
