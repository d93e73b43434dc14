//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Explicit `--config <file>`
//! 2. Current directory: ./dockexec.toml
//! 3. User config: ~/.dockexec/config.toml
//! 4. Built-in defaults

use crate::env;
use crate::executor::ExecutorConfig;
use anyhow::{Context, Result};
use std::env as std_env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Load the explicit file if given, otherwise discover one.
    pub fn load(config_override: Option<&Path>) -> Result<ExecutorConfig> {
        if let Some(path) = config_override {
            info!("Loading configuration override from: {:?}", path);
            return Self::load_file(path);
        }
        Self::discover_config()
    }

    /// Discover and load configuration using the hierarchy
    pub fn discover_config() -> Result<ExecutorConfig> {
        if let Some(config_path) = Self::find_config_file() {
            info!("Loading configuration from: {:?}", config_path);
            return Self::load_file(&config_path);
        }

        debug!("No configuration file found, using defaults");
        Ok(ExecutorConfig::default())
    }

    fn load_file(path: &Path) -> Result<ExecutorConfig> {
        ExecutorConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        let current_dir = std_env::current_dir().ok();
        let home_dir = Self::get_home_dir();
        Self::config_candidates(current_dir.as_deref(), home_dir.as_deref())
            .into_iter()
            .find(|candidate| {
                debug!("Checking for config file: {:?}", candidate);
                candidate.is_file()
            })
    }

    /// Configuration file candidates in priority order
    fn config_candidates(current_dir: Option<&Path>, home_dir: Option<&Path>) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(current_dir) = current_dir {
            candidates.push(env::local_config_file_path(current_dir));
        }
        if let Some(home_dir) = home_dir {
            candidates.push(env::user_config_file_path(home_dir));
        }

        candidates
    }

    /// Get home directory path
    fn get_home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }
}
