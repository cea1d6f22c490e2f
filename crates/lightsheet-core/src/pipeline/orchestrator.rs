use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::types::{AcquisitionSummary, NoOpReporter, ProgressReporter, RunOptions, RunReport, RunStage};
use crate::command::{file_command, preskew_command};
use crate::config::PipelineConfig;
use crate::consts::SETTINGS_JSON_FILENAME;
use crate::discovery::{discover, Acquisition};
use crate::error::Result;
use crate::filename::{FileToken, FilenameClassifier};
use crate::ledger::{Ledger, ProcessedRecord};
use crate::metadata::InstrumentMetadata;
use crate::planner::{Plan, Planner, PsfCatalog};
use crate::scheduler::Scheduler;
use crate::settings::{read_settings, SettingsDocument};
use crate::wait::{wait_for_file, Clock};

/// Shared, read-only state for one run.
struct RunContext<'a> {
    config: &'a PipelineConfig,
    planner: Planner<'a>,
    clock: &'a dyn Clock,
    options: RunOptions,
}

/// Run the whole batch with a thread-safe progress reporter.
///
/// Configuration-class errors abort the run before the ledger is written.
/// Any other error is confined to the acquisition it came from and recorded
/// in the returned report.
pub fn run_pipeline_reported(
    config: &PipelineConfig,
    scheduler: &mut dyn Scheduler,
    clock: &dyn Clock,
    options: RunOptions,
    reporter: &dyn ProgressReporter,
) -> Result<RunReport> {
    info!(
        root = %config.root.display(),
        stages = ?config.enabled_stages(),
        dry_run = options.dry_run,
        "Starting run"
    );

    reporter.begin_stage(RunStage::Cataloguing, None);
    let psf = PsfCatalog::load(config)?;
    reporter.finish_stage();

    let mut ledger = Ledger::load(&config.ledger_path())?;

    reporter.begin_stage(RunStage::Discovering, None);
    let acquisitions = discover(&config.root, &excluded_dirs(config, &ledger))?;
    reporter.finish_stage();
    info!(count = acquisitions.len(), "Discovered acquisitions");

    let ctx = RunContext {
        config,
        planner: Planner::new(config, psf.as_ref()),
        clock,
        options,
    };
    let mut report = RunReport {
        dry_run: options.dry_run,
        ..Default::default()
    };
    let mut records = Vec::new();

    reporter.begin_stage(RunStage::Processing, Some(acquisitions.len()));
    for (i, acquisition) in acquisitions.iter().enumerate() {
        match process_acquisition(&ctx, scheduler, acquisition) {
            Ok(Some((summary, record))) => {
                records.push((acquisition.dir.clone(), record));
                report.processed.push(summary);
            }
            Ok(None) => report.empty.push(acquisition.dir.clone()),
            Err(e) if e.is_fatal_for_run() => return Err(e),
            Err(e) => {
                warn!("Skipping '{}': {e}", acquisition.dir.display());
                report.failed.push((acquisition.dir.clone(), e));
            }
        }
        reporter.advance(i + 1);
    }
    reporter.finish_stage();

    if !options.dry_run {
        reporter.begin_stage(RunStage::Persisting, None);
        ledger.merge(records)?;
        ledger.persist()?;
        reporter.finish_stage();
        debug!(entries = ledger.len(), path = %ledger.path().display(), "Ledger written");
    }

    info!(
        processed = report.processed.len(),
        failed = report.failed.len(),
        jobs = report.job_count(),
        "Run complete"
    );
    Ok(report)
}

/// Run the whole batch without progress reporting.
pub fn run_pipeline(
    config: &PipelineConfig,
    scheduler: &mut dyn Scheduler,
    clock: &dyn Clock,
    options: RunOptions,
) -> Result<RunReport> {
    run_pipeline_reported(config, scheduler, clock, options, &NoOpReporter)
}

/// Ledger entries plus the calibration directories, unless one of them is
/// the data root itself.
fn excluded_dirs(config: &PipelineConfig, ledger: &Ledger) -> BTreeSet<PathBuf> {
    let mut excludes = ledger.excludes();
    let calibration = [
        config.psf.as_ref().map(|p| p.dir.clone()),
        config.flatfield_paths.as_ref().map(|p| p.dir.clone()),
    ];
    for dir in calibration.into_iter().flatten() {
        if dir != config.root {
            excludes.insert(dir);
        }
    }
    excludes
}

/// An acquisition read from disk and planned.
#[derive(Debug)]
pub struct PlannedAcquisition {
    pub settings: SettingsDocument,
    pub metadata: InstrumentMetadata,
    pub plan: Plan,
}

/// Read, classify and plan one acquisition without side effects. `None`
/// when no image file carries the acquisition prefix.
pub fn plan_acquisition(
    planner: &Planner<'_>,
    acquisition: &Acquisition,
) -> Result<Option<PlannedAcquisition>> {
    let settings = read_settings(&acquisition.settings)?;
    let metadata = InstrumentMetadata::from_settings(&acquisition.settings, &settings)?;

    let classifier = FilenameClassifier::new(&acquisition.prefix)?;
    let kind = classifier.detect_kind(acquisition.files.as_slice());
    let mut tokens: Vec<FileToken> = Vec::new();
    for name in &acquisition.files {
        if let Some(token) = classifier.classify(name, kind)? {
            tokens.push(token);
        }
    }
    if tokens.is_empty() {
        return Ok(None);
    }

    let plan = planner.plan(&acquisition.dir, &metadata, kind, &tokens)?;
    Ok(Some(PlannedAcquisition {
        settings,
        metadata,
        plan,
    }))
}

fn process_acquisition(
    ctx: &RunContext<'_>,
    scheduler: &mut dyn Scheduler,
    acquisition: &Acquisition,
) -> Result<Option<(AcquisitionSummary, ProcessedRecord)>> {
    let dir = &acquisition.dir;
    let Some(PlannedAcquisition { settings, plan, .. }) = plan_acquisition(&ctx.planner, acquisition)?
    else {
        warn!(
            "'{}' has no image files starting with '{}'",
            dir.display(),
            acquisition.prefix
        );
        return Ok(None);
    };
    info!(
        acquisition = %dir.display(),
        kind = %plan.kind,
        files = plan.files.len(),
        "Planned acquisition"
    );

    let dry_run = ctx.options.dry_run;
    if !dry_run {
        std::fs::write(
            dir.join(SETTINGS_JSON_FILENAME),
            serde_json::to_string_pretty(&settings)?,
        )?;
        for out in plan.output_dirs() {
            std::fs::create_dir_all(&out)?;
        }
    }

    let mut commands = Vec::new();

    // Pre-skewed PSFs must exist before any decon-first job can start.
    let mut pending = Vec::new();
    for job in &plan.preskew {
        if job.invocation.output.is_file() {
            debug!(psf = %job.invocation.output.display(), "reusing skewed PSF");
            continue;
        }
        let cmd = preskew_command(job);
        if !dry_run {
            scheduler.submit(&cmd)?;
            pending.push(job.invocation.output.clone());
        }
        commands.push(cmd);
    }
    for path in &pending {
        info!(laser_psf = %path.display(), "Waiting for skewed PSF");
        wait_for_file(path, &ctx.options.wait, ctx.clock)?;
    }

    for file in &plan.files {
        let Some(cmd) = file_command(&ctx.config.scheduler, file) else {
            continue;
        };
        if !dry_run {
            scheduler.submit(&cmd)?;
        }
        commands.push(cmd);
    }

    let record = ProcessedRecord::now(ctx.config, &plan);
    let summary = AcquisitionSummary {
        dir: dir.clone(),
        files: plan.files.len(),
        stages: plan.stages.len(),
        commands,
    };
    Ok(Some((summary, record)))
}
