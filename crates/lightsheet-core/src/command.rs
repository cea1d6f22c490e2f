//! Rendering of planned invocations into shell commands.

use std::path::Path;

use crate::config::SchedulerConfig;
use crate::consts::{PSF_SKEW_JOB_FLAGS, SCHEDULER_SUBMIT};
use crate::planner::{CallArg, FilePlan, Invocation, PsfPreskew, StageCall};

/// `<program> <dynamic args> -o <output> <input>`
pub fn render_invocation(invocation: &Invocation) -> String {
    let mut cmd = invocation.program.clone();
    for arg in &invocation.args {
        match arg {
            CallArg::Switch(flag) => {
                cmd.push(' ');
                cmd.push_str(flag);
            }
            CallArg::Value(flag, value) => {
                cmd.push(' ');
                cmd.push_str(flag);
                cmd.push(' ');
                cmd.push_str(&shell_words::quote(value));
            }
        }
    }
    cmd.push_str(&format!(
        " -o {} {}",
        quote_path(&invocation.output),
        quote_path(&invocation.input)
    ));
    cmd
}

/// A path as one job-shell word. Plain paths come back unchanged.
pub fn quote_path(path: &Path) -> String {
    shell_words::quote(&path.to_string_lossy()).into_owned()
}

/// Put a job body inside the double quotes of a submission, escaping what
/// the submitting shell would otherwise expand.
pub fn double_quote(body: &str) -> String {
    let mut quoted = String::with_capacity(body.len() + 2);
    quoted.push('"');
    for c in body.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Every call terminated by `;` so the shell runs them in order.
pub fn chain(calls: &[StageCall]) -> String {
    calls
        .iter()
        .map(|c| format!("{};", render_invocation(&c.invocation)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One scheduler submission for a file's whole chain, or `None` when no
/// stage is enabled.
pub fn file_command(scheduler: &SchedulerConfig, file: &FilePlan) -> Option<String> {
    if file.calls.is_empty() {
        return None;
    }
    Some(scheduler.wrap(&chain(&file.calls)))
}

/// Short single-slot job that skews a resampled PSF.
pub fn preskew_command(job: &PsfPreskew) -> String {
    format!(
        "{SCHEDULER_SUBMIT} {PSF_SKEW_JOB_FLAGS} {}",
        double_quote(&render_invocation(&job.invocation))
    )
}
