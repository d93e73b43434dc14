//! Docker/Podman access for the sandboxed executor.
//!
//! [`ContainerOrchestrator`] implements [`ContainerRuntime`] on top of bollard.
//! [`ContainerClient`] holds the daemon connection and does the inspection calls.
//! [`ContainerConfig`] and [`ExecConfig`] describe what to create and what to run.
//!
//! ```rust,no_run
//! use dockexec::container::{ContainerConfig, ContainerOrchestrator, ContainerRuntime, ExecConfig};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let runtime = ContainerOrchestrator::new().await?;
//! runtime.ensure_image("python:3-slim").await?;
//!
//! let config = ContainerConfig::builder()
//!     .image("python:3-slim")
//!     .cmd(vec!["sleep", "infinity"])
//!     .working_dir("/workspace")
//!     .build()?;
//! let id = runtime.create_container(&config, "scratch").await?;
//! runtime.start_container(&id).await?;
//!
//! let output = runtime
//!     .exec(&id, &ExecConfig::builder().cmd(vec!["python", "--version"]).build())
//!     .await?;
//! println!("{}", output.combined());
//!
//! runtime.stop_container(&id).await?;
//! runtime.remove_container(&id, true).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod executor;
mod orchestrator;
mod runtime;

pub use client::{ContainerClient, ContainerState};
pub use config::{ContainerConfig, ContainerConfigBuilder};
pub use executor::{ExecConfig, ExecConfigBuilder, ExecOutput};
pub use orchestrator::ContainerOrchestrator;
pub use runtime::ContainerRuntime;

/// Container runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Docker/Podman API error
    #[error("Container API error: {0}")]
    ApiError(#[from] bollard::errors::Error),

    /// Container not found
    #[error("Container not found: {0}")]
    NotFound(String),

    /// Container configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Container execution error
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// General error
    #[error("Container error: {0}")]
    Other(String),
}

impl ContainerError {
    /// Whether the error means the container is already stopped or gone.
    ///
    /// Covers "not modified" (already stopped), "not found" and "conflict"
    /// (removal already in progress) responses from the daemon.
    pub fn is_gone(&self) -> bool {
        match self {
            ContainerError::NotFound(_) => true,
            ContainerError::ApiError(bollard::errors::Error::DockerResponseServerError {
                status_code,
                ..
            }) => matches!(status_code, 304 | 404 | 409),
            _ => false,
        }
    }
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn server_error(status_code: u16) -> ContainerError {
        ContainerError::ApiError(bollard::errors::Error::DockerResponseServerError {
            status_code,
            message: "test".to_string(),
        })
    }

    #[test]
    fn test_gone_classification() {
        assert!(ContainerError::NotFound("abc".to_string()).is_gone());
        assert!(server_error(304).is_gone());
        assert!(server_error(404).is_gone());
        assert!(server_error(409).is_gone());
        assert!(!server_error(500).is_gone());
        assert!(!ContainerError::Other("boom".to_string()).is_gone());
    }
}
