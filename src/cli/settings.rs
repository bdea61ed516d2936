use std::path::Path;

use anyhow::Result;
use clap::Subcommand;

use crate::{
    tracker::config::{TrackerConfig, MAX_IDLE_TIMEOUT_SECS, MIN_IDLE_TIMEOUT_SECS},
    window_api::identity::clean_process_name,
};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    #[command(about = "Print the current settings")]
    Show,
    #[command(about = "Set seconds without input after which tracking pauses")]
    IdleTimeout {
        #[arg(value_parser = clap::value_parser!(u64).range(MIN_IDLE_TIMEOUT_SECS..=MAX_IDLE_TIMEOUT_SECS))]
        seconds: u64,
    },
    #[command(about = "Register an executable as a tracked application")]
    AddApp { executable: String, name: String },
}

pub fn process_config_command(app_dir: &Path, command: ConfigCommand) -> Result<()> {
    let mut config = TrackerConfig::load(app_dir)?;
    match command {
        ConfigCommand::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(());
        }
        ConfigCommand::IdleTimeout { seconds } => {
            config.set_idle_timeout(seconds)?;
            println!("Tracking now pauses after {seconds}s without input");
        }
        ConfigCommand::AddApp { executable, name } => {
            let executable = clean_process_name(&executable);
            println!("Tracking {executable} as {name}");
            config.registry.applications.insert(executable, name);
        }
    }
    config.save(app_dir)
}
