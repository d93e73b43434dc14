//! Docker/Podman connection and inspection.
//!
//! [`ContainerClient`] owns the bollard handle and answers the read-only
//! questions the orchestrator asks before acting: is the daemon up, is an image
//! present, does a named container exist and what state is it in.

use crate::container::{ContainerError, Result};
use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::query_parameters::InspectContainerOptions;
use std::sync::Arc;
use tracing::{debug, info};

/// Socket timeout for explicit Podman endpoints, in seconds.
const SOCKET_TIMEOUT_SECS: u64 = 120;

/// Shared handle to the Docker or Podman daemon. Clones share one connection.
#[derive(Clone)]
pub struct ContainerClient {
    docker: Arc<Docker>,
}

impl ContainerClient {
    /// Connect to the first daemon that answers a ping.
    ///
    /// Docker's local defaults (`DOCKER_HOST`, the Unix socket or the Windows
    /// named pipe) are tried first, then the rootless and system Podman sockets.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::Other`] when no endpoint answers.
    pub async fn new() -> Result<Self> {
        let mut candidates = vec![(
            "local Docker defaults".to_string(),
            Docker::connect_with_local_defaults(),
        )];
        candidates.extend(podman_sockets().into_iter().map(|socket| {
            let docker =
                Docker::connect_with_socket(&socket, SOCKET_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION);
            (socket, docker)
        }));

        Ok(Self {
            docker: Arc::new(first_responsive(candidates).await?),
        })
    }

    /// Wrap an existing bollard handle.
    pub fn from_docker(docker: Docker) -> Self {
        Self {
            docker: Arc::new(docker),
        }
    }

    /// Check that the daemon is reachable.
    pub async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map_err(|e| ContainerError::Other(format!("Container runtime did not answer ping: {}", e)))?;
        Ok(())
    }

    /// The underlying bollard handle.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// Whether `image` is present in the local image store.
    pub async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if status_code(&e) == Some(404) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// ID of the container called `name`, or `None` if there is none.
    pub async fn find_container_id(&self, name: &str) -> Result<Option<String>> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => Ok(inspect.id),
            Err(e) if status_code(&e) == Some(404) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Current state of a container, by name or ID.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotFound`] if the container does not exist.
    pub async fn container_state(&self, name_or_id: &str) -> Result<ContainerState> {
        let inspect = self
            .docker
            .inspect_container(name_or_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| match status_code(&e) {
                Some(404) => ContainerError::NotFound(name_or_id.to_string()),
                _ => e.into(),
            })?;

        Ok(inspect
            .state
            .as_ref()
            .map(ContainerState::from)
            .unwrap_or(ContainerState::Stopped))
    }
}

/// Pick the first endpoint that connects and answers a ping.
///
/// Handles to missing sockets build fine; only the ping proves a live daemon.
async fn first_responsive(
    candidates: Vec<(String, std::result::Result<Docker, BollardError>)>,
) -> Result<Docker> {
    for (endpoint, docker) in candidates {
        let docker = match docker {
            Ok(docker) => docker,
            Err(e) => {
                debug!("{} unavailable: {}", endpoint, e);
                continue;
            }
        };
        match docker.ping().await {
            Ok(_) => {
                info!("Using container runtime at {}", endpoint);
                return Ok(docker);
            }
            Err(e) => debug!("{} did not answer ping: {}", endpoint, e),
        }
    }

    Err(ContainerError::Other(
        "No Docker or Podman daemon answered. Start Docker/Podman or set DOCKER_HOST.".to_string(),
    ))
}

#[cfg(unix)]
fn podman_sockets() -> Vec<String> {
    let mut sockets = Vec::new();
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        sockets.push(format!("unix://{}/podman/podman.sock", runtime_dir));
    }
    sockets.push("unix:///run/podman/podman.sock".to_string());
    sockets
}

#[cfg(not(unix))]
fn podman_sockets() -> Vec<String> {
    Vec::new()
}

fn status_code(error: &BollardError) -> Option<u16> {
    match error {
        BollardError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

/// Coarse container state as seen by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Paused,
    Restarting,
    /// Created or exited
    Stopped,
    Dead,
}

impl From<&bollard::models::ContainerState> for ContainerState {
    fn from(state: &bollard::models::ContainerState) -> Self {
        if state.dead.unwrap_or(false) {
            ContainerState::Dead
        } else if state.restarting.unwrap_or(false) {
            ContainerState::Restarting
        } else if state.paused.unwrap_or(false) {
            ContainerState::Paused
        } else if state.running.unwrap_or(false) {
            ContainerState::Running
        } else {
            ContainerState::Stopped
        }
    }
}
