//! CLI-specific functionality for dockexec
//!
//! This module contains all CLI-related code including argument parsing
//! and configuration discovery.

pub mod args;
pub mod config;

pub use args::{Args, ConfigFormat, ExecutionMode, ExecutorOverrides, RunConfig, ShowConfigOptions};
pub use config::ConfigDiscovery;
