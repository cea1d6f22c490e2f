mod commands;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lightsheet", about = "Light-sheet acquisition batch processing")]
#[command(version)]
struct Cli {
    /// Enable verbose output and print every submitted command
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover acquisitions, plan them and submit their jobs
    Run(commands::run::RunArgs),
    /// Show how one acquisition directory would be classified and planned
    Inspect(commands::inspect::InspectArgs),
    /// Parse an instrument settings file and print it as JSON
    Settings(commands::settings::SettingsArgs),
    /// Print or save an example configuration
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Run(args) => commands::run::run(args, cli.verbose),
        Commands::Inspect(args) => commands::inspect::run(args),
        Commands::Settings(args) => commands::settings::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
