pub mod console;
pub mod dates;
pub mod report;
pub mod sessions;
pub mod settings;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use report::ReportCommand;
use sessions::SessionsCommand;
use settings::ConfigCommand;
use tracing::level_filters::LevelFilter;

use crate::{
    storage::file_storage::FileStorage,
    utils::{
        dir::application_path,
        logging::{enable_logging, CLI_PREFIX, TRACKER_PREFIX},
        runtime::{multi_thread_runtime, single_thread_runtime},
    },
};

/// Data lives in this directory under the application directory.
const DATA_DIR: &str = "data";

#[derive(Parser, Debug)]
#[command(name = "Worktally", version, long_about = None)]
#[command(about = "Tracks time per application and language, and named work sessions", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Mirror logs to the console with the given level, e.g. debug")]
    log: Option<LevelFilter>,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run the tracker in this console. Type `help` once it's running")]
    Track {
        #[arg(long, help = "Identifier stored with every session created by this tracker")]
        user: Option<String>,
    },
    #[command(about = "Show time spent per application, language or day")]
    Report {
        #[command(flatten)]
        command: ReportCommand,
    },
    #[command(subcommand, about = "List and manage finalized sessions")]
    Sessions(SessionsCommand),
    #[command(subcommand, about = "Show or change tracker settings")]
    Config(ConfigCommand),
}

pub fn run_cli() -> Result<()> {
    let args = Args::parse();
    let app_dir = application_path(args.dir)?;

    let prefix = match args.commands {
        Commands::Track { .. } => TRACKER_PREFIX,
        _ => CLI_PREFIX,
    };
    enable_logging(prefix, &app_dir.join("logs"), args.log, args.log.is_some())?;

    match args.commands {
        Commands::Track { user } => multi_thread_runtime()?
            .block_on(async move { console::run_tracker(app_dir, user).await }),
        Commands::Report { command } => single_thread_runtime()?.block_on(async move {
            report::process_report_command(&open_storage(&app_dir)?, command).await
        }),
        Commands::Sessions(command) => single_thread_runtime()?.block_on(async move {
            sessions::process_sessions_command(&app_dir, open_storage(&app_dir)?, command).await
        }),
        Commands::Config(command) => settings::process_config_command(&app_dir, command),
    }
}

pub fn open_storage(app_dir: &std::path::Path) -> Result<FileStorage> {
    Ok(FileStorage::new(app_dir.join(DATA_DIR))?)
}
