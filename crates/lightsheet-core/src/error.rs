use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LightsheetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metadata error in '{}': {reason}", path.display())]
    Metadata { path: PathBuf, reason: String },

    #[error("Cannot classify file '{name}': {reason}")]
    Filename { name: String, reason: String },

    #[error(
        "Unexpected naming convention: channel {channel} has {lasers} laser(s) but {tokens} file channel(s)"
    )]
    NamingAmbiguity {
        channel: u32,
        lasers: usize,
        tokens: usize,
    },

    #[error("'{}' did not appear after {attempts} attempt(s)", path.display())]
    DependencyTimeout { path: PathBuf, attempts: u32 },

    #[error("Job submission failed: {0}")]
    Submission(String),
}

impl LightsheetError {
    pub fn metadata(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Metadata {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn filename(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Filename {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Configuration problems abort the whole run; everything else is scoped
    /// to the acquisition being processed.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Toml(_))
    }
}

pub type Result<T> = std::result::Result<T, LightsheetError>;
