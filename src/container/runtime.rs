//! Container runtime abstraction.
//!
//! [`ContainerRuntime`] is the seam between the sandboxed executor and the
//! container engine. [`ContainerOrchestrator`](super::ContainerOrchestrator)
//! implements it over bollard; tests substitute an in-memory runtime.

use crate::container::{ContainerConfig, ContainerState, ExecConfig, ExecOutput, Result};
use async_trait::async_trait;

/// Operations the executor needs from a container engine.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Make sure `image` is available locally, pulling it if necessary.
    async fn ensure_image(&self, image: &str) -> Result<()>;

    /// Look up a container by name, returning its ID if it exists.
    async fn find_container(&self, name: &str) -> Result<Option<String>>;

    /// Create (but do not start) a container, returning its ID.
    async fn create_container(&self, config: &ContainerConfig, name: &str) -> Result<String>;

    /// Start a created or stopped container.
    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Inspect the current state of a container.
    async fn container_state(&self, container_id: &str) -> Result<ContainerState>;

    /// Run a command inside a running container and collect its output.
    async fn exec(&self, container_id: &str, config: &ExecConfig) -> Result<ExecOutput>;

    /// Stop a running container.
    async fn stop_container(&self, container_id: &str) -> Result<()>;

    /// Restart a container in place.
    async fn restart_container(&self, container_id: &str) -> Result<()>;

    /// Remove a container.
    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()>;
}
