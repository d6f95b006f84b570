//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;

use crate::config;

mod commands;

#[derive(Parser)]
#[command(name = "grace")]
#[command(version = "0.1")]
#[command(about = "Terminal chat client for the Gemini API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override the system prompt from config
    #[arg(long)]
    system_prompt: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Starts an interactive chat
    Chat,

    /// Manage saved sessions
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum SessionCommands {
    /// Lists saved sessions
    List,
    /// Shows a session transcript
    Show {
        /// The ID of the session to show
        #[arg(value_name = "SESSION_ID")]
        id: String,
    },
    /// Renames a session
    Rename {
        /// The ID of the session to rename
        #[arg(value_name = "SESSION_ID")]
        id: String,
        /// The new title
        title: String,
    },
    /// Deletes a session
    Delete {
        /// The ID of the session to delete
        #[arg(value_name = "SESSION_ID")]
        id: String,
    },
    /// Exports a session to <id>.json
    Export {
        /// The ID of the session to export
        #[arg(value_name = "SESSION_ID")]
        id: String,
        /// Directory to write the export into (default: current directory)
        #[arg(long, value_name = "DIR")]
        out: Option<String>,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Set the model in the config file
    SetModel {
        /// The model identifier to store
        model: String,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let mut config = config::Config::load().context("load config")?;

    if let Some(sp) = cli.system_prompt.as_deref() {
        let trimmed = sp.trim();
        if trimmed.is_empty() {
            config.system_prompt = None;
            config.system_prompt_file = None;
        } else {
            config.system_prompt = Some(trimmed.to_string());
            config.system_prompt_file = None;
        }
    }

    // default to chat mode
    let Some(command) = cli.command else {
        return commands::chat::run(&config).await;
    };

    match command {
        Commands::Chat => commands::chat::run(&config).await,

        Commands::Sessions { command } => match command {
            SessionCommands::List => commands::sessions::list(),
            SessionCommands::Show { id } => commands::sessions::show(&id),
            SessionCommands::Rename { id, title } => commands::sessions::rename(&id, &title),
            SessionCommands::Delete { id } => commands::sessions::delete(&id),
            SessionCommands::Export { id, out } => commands::sessions::export(&id, out.as_deref()),
        },

        Commands::Config { command } => match command {
            ConfigCommands::Path => commands::config::path(),
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::SetModel { model } => commands::config::set_model(&model),
        },
    }
}
