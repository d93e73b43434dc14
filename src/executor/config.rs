//! Executor configuration and component (de)serialization.
//!
//! [`ExecutorConfig`] carries every option of the Docker command-line executor.
//! [`ComponentModel`] wraps it with provider metadata so a dumped configuration
//! can be persisted and later loaded back into an equivalent executor.

use super::ExecutorError;
use crate::env;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Provider string identifying [`DockerCommandLineCodeExecutor`](super::DockerCommandLineCodeExecutor) components.
pub const DOCKER_EXECUTOR_PROVIDER: &str = "dockexec.executor.DockerCommandLineCodeExecutor";

/// Component type recorded in dumped models.
pub const CODE_EXECUTOR_COMPONENT_TYPE: &str = "code_executor";

/// Version of the dumped configuration layout.
pub const COMPONENT_VERSION: u32 = 1;

/// Additional bind mount: container path and access mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeBinding {
    /// Mount target inside the container
    pub bind: String,
    /// Access mode, `rw` or `ro`
    #[serde(default = "default_volume_mode")]
    pub mode: String,
}

fn default_volume_mode() -> String {
    "rw".to_string()
}

impl VolumeBinding {
    /// Create a binding with an explicit mode.
    pub fn new(bind: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            bind: bind.into(),
            mode: mode.into(),
        }
    }
}

/// Configuration of the Docker command-line code executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutorConfig {
    /// Container image
    #[serde(default = "default_image")]
    pub image: String,

    /// Fixed container name; a unique name is generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,

    /// Per-block timeout in seconds (>= 1)
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Host working directory; an ephemeral one is created on start when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,

    /// Path handed to the container runtime as the workspace mount source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_dir: Option<PathBuf>,

    /// Remove the container when it stops
    #[serde(default = "default_true")]
    pub auto_remove: bool,

    /// Stop the container when the executor is dropped while running
    #[serde(default = "default_true")]
    pub stop_container: bool,

    /// Shell command run once after the container starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_command: Option<String>,

    /// Name of the importable functions module
    #[serde(default = "default_functions_module")]
    pub functions_module: String,

    /// Delete each written code file after its block runs
    #[serde(default)]
    pub delete_tmp_files: bool,

    /// Per-block output cap in bytes
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    // TOML tables must follow plain values.
    /// Extra mounts: host path -> container binding
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_volumes: BTreeMap<String, VolumeBinding>,

    /// Extra `/etc/hosts` entries: hostname -> IP
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_hosts: BTreeMap<String, String>,
}

fn default_image() -> String {
    env::container::DEFAULT_IMAGE.to_string()
}

fn default_timeout() -> u64 {
    env::executor::DEFAULT_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

fn default_functions_module() -> String {
    env::executor::DEFAULT_FUNCTIONS_MODULE.to_string()
}

fn default_max_output_bytes() -> usize {
    env::executor::DEFAULT_MAX_OUTPUT_BYTES
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            container_name: None,
            timeout: default_timeout(),
            work_dir: None,
            bind_dir: None,
            auto_remove: true,
            stop_container: true,
            extra_volumes: BTreeMap::new(),
            extra_hosts: BTreeMap::new(),
            init_command: None,
            functions_module: default_functions_module(),
            delete_tmp_files: false,
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl ExecutorConfig {
    /// Create a configuration for the given image with defaults elsewhere.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Set the per-block timeout in seconds
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Set a fixed container name
    pub fn with_container_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = Some(name.into());
        self
    }

    /// Set the host working directory
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Set the bind directory
    pub fn with_bind_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bind_dir = Some(dir.into());
        self
    }

    pub fn with_auto_remove(mut self, enable: bool) -> Self {
        self.auto_remove = enable;
        self
    }

    pub fn with_stop_container(mut self, enable: bool) -> Self {
        self.stop_container = enable;
        self
    }

    /// Add an extra volume mount
    pub fn with_extra_volume(
        mut self,
        host_path: impl Into<String>,
        binding: VolumeBinding,
    ) -> Self {
        self.extra_volumes.insert(host_path.into(), binding);
        self
    }

    /// Add an `/etc/hosts` entry
    pub fn with_extra_host(mut self, host: impl Into<String>, addr: impl Into<String>) -> Self {
        self.extra_hosts.insert(host.into(), addr.into());
        self
    }

    pub fn with_init_command(mut self, command: impl Into<String>) -> Self {
        self.init_command = Some(command.into());
        self
    }

    pub fn with_functions_module(mut self, module: impl Into<String>) -> Self {
        self.functions_module = module.into();
        self
    }

    pub fn with_delete_tmp_files(mut self, enable: bool) -> Self {
        self.delete_tmp_files = enable;
        self
    }

    pub fn with_max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = limit;
        self
    }

    /// Check invariants that construction relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::InvalidTimeout`] when `timeout` is zero and
    /// [`ExecutorError::Config`] for an empty image or functions module name.
    pub fn validate(&self) -> Result<(), ExecutorError> {
        if self.timeout < 1 {
            return Err(ExecutorError::InvalidTimeout);
        }
        if self.image.trim().is_empty() {
            return Err(ExecutorError::Config("image must not be empty".to_string()));
        }
        if !is_identifier(&self.functions_module) {
            return Err(ExecutorError::Config(format!(
                "functions_module must be a valid module name, got {:?}",
                self.functions_module
            )));
        }
        Ok(())
    }

    /// Parse from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ExecutorError> {
        toml::from_str(content).map_err(|e| ExecutorError::Config(e.to_string()))
    }

    /// Serialize to a pretty TOML string.
    pub fn to_toml_string(&self) -> Result<String, ExecutorError> {
        toml::to_string_pretty(self).map_err(|e| ExecutorError::Config(e.to_string()))
    }

    /// Load from a TOML file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ExecutorError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Save to a TOML file.
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ExecutorError> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {
            chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        _ => false,
    }
}

/// Serialized form of a component: provider metadata plus its configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentModel {
    /// Fully qualified provider of the component
    pub provider: String,
    /// Kind of component
    pub component_type: String,
    /// Layout version
    pub version: u32,
    /// Component configuration
    pub config: ExecutorConfig,
}

impl ComponentModel {
    /// Wrap an executor configuration.
    pub fn docker_executor(config: ExecutorConfig) -> Self {
        Self {
            provider: DOCKER_EXECUTOR_PROVIDER.to_string(),
            component_type: CODE_EXECUTOR_COMPONENT_TYPE.to_string(),
            version: COMPONENT_VERSION,
            config,
        }
    }

    /// Parse from JSON.
    pub fn from_json(content: &str) -> Result<Self, ExecutorError> {
        serde_json::from_str(content).map_err(|e| ExecutorError::Config(e.to_string()))
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, ExecutorError> {
        serde_json::to_string_pretty(self).map_err(|e| ExecutorError::Config(e.to_string()))
    }
}
