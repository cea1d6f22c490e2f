use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use lightsheet_core::channels::resolve_channels;
use lightsheet_core::command::{file_command, preskew_command};
use lightsheet_core::config::PipelineConfig;
use lightsheet_core::discovery::read_acquisition;
use lightsheet_core::filename::FilenameClassifier;
use lightsheet_core::metadata::InstrumentMetadata;
use lightsheet_core::pipeline::plan_acquisition;
use lightsheet_core::planner::{Planner, PsfCatalog};
use lightsheet_core::settings::read_settings;

use crate::summary::print_channel_map;

#[derive(Args)]
pub struct InspectArgs {
    /// Acquisition directory
    pub dir: PathBuf,

    /// Also plan the acquisition against this configuration and print its commands
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub fn run(args: &InspectArgs) -> Result<()> {
    let acquisition = read_acquisition(&args.dir)
        .with_context(|| format!("Failed to list {}", args.dir.display()))?
        .ok_or_else(|| anyhow!("{} holds no settings file", args.dir.display()))?;

    let settings = read_settings(&acquisition.settings)?;
    let metadata = InstrumentMetadata::from_settings(&acquisition.settings, &settings)?;
    let classifier = FilenameClassifier::new(&acquisition.prefix)?;
    let kind = classifier.detect_kind(acquisition.files.as_slice());
    let mut files = Vec::new();
    for name in &acquisition.files {
        if let Some(token) = classifier.classify(name, kind)? {
            files.push(token);
        }
    }

    println!("Settings:    {}", acquisition.settings.display());
    println!("Prefix:      {}", acquisition.prefix);
    println!("Kind:        {kind}");
    println!("Motion:      {}", metadata.motion());
    println!("Lasers:      {:?}", metadata.lasers());
    match metadata.scan_steps() {
        Ok(steps) => println!("Scan steps:  {steps:?}"),
        Err(e) => println!("Scan steps:  {e}"),
    }
    println!("Images:      {}", files.len());
    println!();

    if files.is_empty() {
        return Ok(());
    }
    let map = resolve_channels(kind, &files, &metadata)?;
    print_channel_map(&map);

    let Some(ref config_path) = args.config else {
        return Ok(());
    };
    let config = PipelineConfig::load(config_path)
        .with_context(|| format!("Invalid pipeline config {}", config_path.display()))?;
    let psf = PsfCatalog::load(&config)?;
    let planner = Planner::new(&config, psf.as_ref());
    let Some(planned) = plan_acquisition(&planner, &acquisition)? else {
        return Ok(());
    };
    for job in &planned.plan.preskew {
        println!("{}", preskew_command(job));
    }
    for file in &planned.plan.files {
        if let Some(cmd) = file_command(&config.scheduler, file) {
            println!("{cmd}");
        }
    }
    Ok(())
}
