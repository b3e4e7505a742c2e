//! CLI module — command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod common;
pub mod config;
pub mod inspect;
pub mod sanitize;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "convoclaw")]
#[command(version)]
#[command(about = "Conversation state and compaction engine for chat agents", long_about = None)]
struct Cli {
    /// Config file to use instead of ~/.convoclaw/config.json
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a raw model reply read from stdin
    Sanitize,
    /// Show the request a session would send next
    Inspect {
        /// Session JSON file (e.g. ~/.convoclaw/sessions/telegram%3A42.json)
        session: PathBuf,
        /// New user message to append to the assembled request
        #[arg(short, long, default_value = "")]
        message: String,
        /// Print full message contents instead of previews
        #[arg(long)]
        full: bool,
    },
    /// Show or check configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (file + environment)
    Show,
    /// Validate the configuration file
    Check,
}

/// Parse arguments and run the selected command.
pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Logging settings come from the config when it loads; commands report
    // config errors themselves.
    let logging_cfg = common::load_config(cli.config.as_deref())
        .map(|c| c.logging)
        .unwrap_or_default();
    if let Err(e) = convoclaw::utils::logging::init_logging(&logging_cfg) {
        eprintln!("Warning: {}", e);
    }

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Sanitize) => {
            sanitize::cmd_sanitize()?;
        }
        Some(Commands::Inspect {
            session,
            message,
            full,
        }) => {
            let config = common::load_config(cli.config.as_deref())?;
            config.validate()?;
            inspect::cmd_inspect(&config, &session, &message, full)?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(cli.config.as_deref(), action.unwrap_or(ConfigAction::Show))?;
        }
    }

    Ok(())
}
