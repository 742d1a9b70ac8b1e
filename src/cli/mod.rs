//! CLI-specific functionality for the container runner
//!
//! This module contains all CLI-related code including argument parsing
//! and configuration discovery.

pub mod args;
pub mod config;

pub use args::{Args, DispatchConfig, ExecutionMode};
pub use config::ConfigDiscovery;
