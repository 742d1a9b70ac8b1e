//! Command line argument parsing
//!
//! Subcommands:
//! - `dispatch`: Reconcile the managed container after a lifecycle event
//! - `status`: Show the persisted unit state
//! - `show-config`: Show configuration discovery information

use crate::env;
use crate::reconciler::HookEvent;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug)]
pub enum ExecutionMode {
    Dispatch(DispatchConfig),
    Status { unit_dir: PathBuf },
    ShowConfig { unit_dir: PathBuf },
}

#[derive(Debug)]
pub struct DispatchConfig {
    pub event: HookEvent,
    pub unit_dir: PathBuf,
    pub config_override: Option<PathBuf>,
}

#[derive(Debug, Parser)]
#[command(name = "container-runner")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Runs a single OCI image as a managed Docker container")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Reconcile the managed container after a lifecycle event
    Dispatch {
        /// Lifecycle event to handle
        #[arg(value_enum)]
        event: HookEvent,
        /// Unit directory holding resources, relations, secrets and state
        #[arg(short = 'u', long = "unit-dir", default_value = env::DEFAULT_UNIT_DIR)]
        unit_dir: PathBuf,
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
    },
    /// Show the persisted unit state
    Status {
        /// Unit directory holding resources, relations, secrets and state
        #[arg(short = 'u', long = "unit-dir", default_value = env::DEFAULT_UNIT_DIR)]
        unit_dir: PathBuf,
    },
    /// Show configuration discovery information
    ShowConfig {
        /// Unit directory holding resources, relations, secrets and state
        #[arg(short = 'u', long = "unit-dir", default_value = env::DEFAULT_UNIT_DIR)]
        unit_dir: PathBuf,
    },
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Dispatch {
                event,
                unit_dir,
                config,
            }) => Ok(ExecutionMode::Dispatch(DispatchConfig {
                event: *event,
                unit_dir: unit_dir.clone(),
                config_override: config.clone(),
            })),
            Some(Commands::Status { unit_dir }) => Ok(ExecutionMode::Status {
                unit_dir: unit_dir.clone(),
            }),
            Some(Commands::ShowConfig { unit_dir }) => Ok(ExecutionMode::ShowConfig {
                unit_dir: unit_dir.clone(),
            }),
            None => Err(
                "No command specified. Use 'container-runner --help' to see available commands."
                    .to_string(),
            ),
        }
    }
}
