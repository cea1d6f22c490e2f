use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use lightsheet_core::config::RawConfig;

#[derive(Args)]
pub struct ConfigArgs {
    /// Write config to a file instead of stdout. A `.toml` extension selects TOML.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print or save a complete example configuration.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let config = RawConfig::example();
    let as_toml = args
        .output
        .as_ref()
        .and_then(|p| p.extension())
        .is_some_and(|e| e == "toml");
    let text = if as_toml {
        toml::to_string_pretty(&config)?
    } else {
        serde_json::to_string_pretty(&config)? + "\n"
    };

    if let Some(ref path) = args.output {
        std::fs::write(path, &text)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        println!("Example config saved to {}", path.display());
    } else {
        print!("{}", text);
    }

    Ok(())
}
