//! streamchat CLI: the main entry point.
//!
//! Commands:
//! - `onboard`: Write a default config file
//! - `run`    : Start the bot on the console connector
//! - `status` : Show the effective configuration at a glance
//! - `config` : Validate, print or locate the config file

use clap::{Parser, Subcommand};
use streamchat_config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "streamchat",
    about = "streamchat: live-stream chat bot with commands, event reactions and generated replies",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Onboard,

    /// Start the bot, reading chat from the console
    Run {
        /// Chat channel console lines go to until one names another
        #[arg(short, long, default_value = "#console")]
        channel: String,

        /// Override the number of pipeline workers
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Show system status
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Load and validate the config file
    Validate,
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file path
    Path,
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // A broken config is reported by the command itself.
    let json_logs = AppConfig::load().is_ok_and(|c| c.logging.json);
    init_tracing(cli.verbose, json_logs);

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Run { channel, workers } => commands::run::run(channel, workers).await?,
        Commands::Status => commands::status::run().await?,
        Commands::Config { action } => match action {
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
    }

    Ok(())
}
