//! bollard-backed [`ContainerRuntime`].

use crate::container::{
    ContainerClient, ContainerConfig, ContainerError, ContainerRuntime, ContainerState,
    ExecConfig, ExecOutput, Result,
};
use crate::env;
use async_trait::async_trait;
use bollard::models::ContainerCreateBody;
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, RemoveContainerOptions, RestartContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use futures::stream::StreamExt;
use tracing::{debug, info};

/// Drives containers on a Docker or Podman daemon.
pub struct ContainerOrchestrator {
    client: ContainerClient,
    auto_pull: bool,
    stop_timeout: i32,
}

impl ContainerOrchestrator {
    /// Connect to the local daemon with image auto-pull enabled.
    ///
    /// # Errors
    ///
    /// Returns error if no Docker/Podman daemon is reachable.
    pub async fn new() -> Result<Self> {
        Ok(Self::from_client(ContainerClient::new().await?))
    }

    pub fn from_client(client: ContainerClient) -> Self {
        Self {
            client,
            auto_pull: true,
            stop_timeout: env::container::STOP_TIMEOUT_SECS,
        }
    }

    /// Fail `ensure_image` instead of pulling missing images.
    pub fn with_auto_pull(mut self, enable: bool) -> Self {
        self.auto_pull = enable;
        self
    }

    /// Seconds `docker stop`/`restart` wait before killing the main process.
    pub fn with_stop_timeout(mut self, seconds: i32) -> Self {
        self.stop_timeout = seconds;
        self
    }

    pub fn client(&self) -> &ContainerClient {
        &self.client
    }

    /// Pull `image`, draining the progress stream.
    pub async fn pull_image(&self, image: &str) -> Result<()> {
        info!("Pulling image {}", image);
        let mut progress = self.client.docker().create_image(
            Some(CreateImageOptions {
                from_image: Some(image.to_string()),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(event) = progress.next().await {
            if let Some(status) = event?.status {
                debug!("{}: {}", image, status);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for ContainerOrchestrator {
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.client.image_exists(image).await? {
            debug!("Image {} present", image);
            return Ok(());
        }
        if !self.auto_pull {
            return Err(ContainerError::NotFound(format!("image {}", image)));
        }
        self.pull_image(image).await
    }

    async fn find_container(&self, name: &str) -> Result<Option<String>> {
        self.client.find_container_id(name).await
    }

    async fn create_container(&self, config: &ContainerConfig, name: &str) -> Result<String> {
        let body = ContainerCreateBody {
            image: Some(config.image.clone()),
            cmd: config.cmd.clone(),
            working_dir: config.working_dir.clone(),
            env: config.env.clone(),
            labels: config.labels.clone(),
            host_config: Some(config.host_config.clone()),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: Some(name.to_string()),
            ..Default::default()
        };

        let created = self
            .client
            .docker()
            .create_container(Some(options), body)
            .await?;
        info!("Created container {} ({})", name, created.id);
        Ok(created.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        self.client
            .docker()
            .start_container(container_id, None::<StartContainerOptions>)
            .await?;
        debug!("Started container {}", container_id);
        Ok(())
    }

    async fn container_state(&self, container_id: &str) -> Result<ContainerState> {
        self.client.container_state(container_id).await
    }

    async fn exec(&self, container_id: &str, config: &ExecConfig) -> Result<ExecOutput> {
        crate::container::executor::execute(self.client.docker(), container_id, config).await
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        self.client
            .docker()
            .stop_container(
                container_id,
                Some(StopContainerOptions {
                    t: Some(self.stop_timeout),
                    ..Default::default()
                }),
            )
            .await?;
        debug!("Stopped container {}", container_id);
        Ok(())
    }

    async fn restart_container(&self, container_id: &str) -> Result<()> {
        self.client
            .docker()
            .restart_container(
                container_id,
                Some(RestartContainerOptions {
                    t: Some(self.stop_timeout),
                    ..Default::default()
                }),
            )
            .await?;
        debug!("Restarted container {}", container_id);
        Ok(())
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        self.client
            .docker()
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force,
                    v: true,
                    ..Default::default()
                }),
            )
            .await?;
        debug!("Removed container {}", container_id);
        Ok(())
    }
}
