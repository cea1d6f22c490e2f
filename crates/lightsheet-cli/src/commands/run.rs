use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use lightsheet_core::config::PipelineConfig;
use lightsheet_core::pipeline::{run_pipeline_reported, ProgressReporter, RunOptions, RunStage};
use lightsheet_core::scheduler::ShellScheduler;
use lightsheet_core::wait::SystemClock;

use crate::summary::{print_run_header, print_run_report};

#[derive(Args)]
pub struct RunArgs {
    /// Pipeline configuration (JSON, or TOML by extension)
    pub config: PathBuf,

    /// Plan and print commands without creating directories, submitting
    /// jobs or writing the ledger
    #[arg(short, long)]
    pub dry_run: bool,
}

/// Drives an indicatif bar from run progress.
struct BarReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarReporter {
    fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: RunStage, total_items: Option<usize>) {
        let bar = match total_items {
            Some(n) => {
                let bar = ProgressBar::new(n as u64);
                if let Ok(style) = ProgressStyle::default_bar().template("{msg:26} [{bar:40}] {pos}/{len}") {
                    bar.set_style(style.progress_chars("=> "));
                }
                bar
            }
            None => ProgressBar::new_spinner(),
        };
        bar.set_message(stage.to_string());
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    fn advance(&self, items_done: usize) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.set_position(items_done as u64);
            }
        }
    }

    fn finish_stage(&self) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
    }
}

pub fn run(args: &RunArgs, verbose: bool) -> Result<()> {
    let config = PipelineConfig::load(&args.config)
        .with_context(|| format!("Invalid pipeline config {}", args.config.display()))?;

    print_run_header(&config, args.dry_run);

    let options = RunOptions {
        dry_run: args.dry_run,
        ..Default::default()
    };
    let reporter = BarReporter::new();
    let report = run_pipeline_reported(
        &config,
        &mut ShellScheduler,
        &SystemClock,
        options,
        &reporter,
    )
    .context("Run aborted")?;

    if verbose || args.dry_run {
        for cmd in report.commands() {
            println!("{cmd}");
        }
    }
    print_run_report(&report);

    if report.has_failures() {
        bail!("{} acquisition(s) failed", report.failed.len());
    }
    Ok(())
}
