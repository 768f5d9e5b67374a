use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Windows service installer using native registry calls")]
pub struct Args {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Run against an in-memory service store instead of the live one
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub sub: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Write the service record (Exit 0 = installed, 1 = failed)
    Install {
        /// Executable the service runs
        exe_path: PathBuf,
        service_name: String,
        display_name: Option<String>,
        description: Option<String>,
    },
    /// Stop the service if running and delete its record
    Uninstall { service_name: String },
    /// Start the service (Exit 0 = success, 1 = failed)
    Start { service_name: String },
    /// Stop the service (Exit 0 = success, 1 = failed)
    Stop { service_name: String },
    /// Show service state (Exit 0 = known, 1 = missing or error)
    Status { service_name: String },
}
