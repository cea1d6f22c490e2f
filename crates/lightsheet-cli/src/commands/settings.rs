use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use lightsheet_core::metadata::InstrumentMetadata;
use lightsheet_core::settings::read_settings;

#[derive(Args)]
pub struct SettingsArgs {
    /// Instrument settings file (`*Settings.txt`)
    pub file: PathBuf,

    /// Write the JSON to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &SettingsArgs) -> Result<()> {
    let doc = read_settings(&args.file)
        .with_context(|| format!("Failed to read settings {}", args.file.display()))?;
    // Surface metadata problems the planner would hit, without failing.
    if let Err(e) = InstrumentMetadata::from_settings(&args.file, &doc) {
        eprintln!("warning: {e}");
    }
    let json = serde_json::to_string_pretty(&doc)?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Settings saved to {}", path.display());
    } else {
        println!("{json}");
    }
    Ok(())
}
