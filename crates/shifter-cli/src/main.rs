use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use shifter_infrastructure::ConfigService;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "shifter")]
#[command(about = "Sacred Shifter - session, energy focus and progression state", long_about = None)]
struct Cli {
    /// Config file (defaults to $SHIFTER_CONFIG, then the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sign-up → focus → award → sign-out session and print each state
    Demo(commands::demo::DemoArgs),
    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print the progression tier table in use
    Tiers,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the resolved config file path
    Path,
    /// Print the effective configuration as TOML
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let service = ConfigService::discover(cli.config.as_deref())?;
    let config = service.get_config()?;
    let analytics = logging::init(&config.logging);
    tracing::debug!(config = %service.path().display(), "Configuration loaded");

    match cli.command {
        Commands::Demo(args) => commands::demo::run(&config, args, analytics).await?,
        Commands::Config { action } => match action {
            ConfigAction::Path => commands::config::path(&service),
            ConfigAction::Show => commands::config::show(&config)?,
        },
        Commands::Tiers => commands::tiers::run(&config)?,
    }

    Ok(())
}
