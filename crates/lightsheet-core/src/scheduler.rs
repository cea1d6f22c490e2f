use std::process::Command;

use tracing::debug;

use crate::error::{LightsheetError, Result};

/// Where synthesized job commands go.
pub trait Scheduler {
    /// Hand one complete submission command over. Returns once the
    /// scheduler has accepted it, not when the job finishes.
    fn submit(&mut self, command: &str) -> Result<()>;
}

/// Runs each submission through `sh -c`.
#[derive(Debug, Default)]
pub struct ShellScheduler;

impl Scheduler for ShellScheduler {
    fn submit(&mut self, command: &str) -> Result<()> {
        debug!(command, "submitting");
        let status = Command::new("sh").arg("-c").arg(command).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(LightsheetError::Submission(format!(
                "'{command}' exited with {status}"
            )))
        }
    }
}

/// Keeps submissions in memory instead of running them.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    submitted: Vec<String>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> &[String] {
        &self.submitted
    }
}

impl Scheduler for RecordingScheduler {
    fn submit(&mut self, command: &str) -> Result<()> {
        self.submitted.push(command.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_keeps_order() {
        let mut s = RecordingScheduler::new();
        s.submit("bsub \"a;\"").unwrap();
        s.submit("bsub \"b;\"").unwrap();
        assert_eq!(s.submitted(), &["bsub \"a;\"", "bsub \"b;\""]);
    }
}
