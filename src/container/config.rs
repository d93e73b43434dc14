//! Container creation parameters.

use crate::container::{ContainerError, Result};
use bollard::models::HostConfig;
use std::collections::HashMap;

/// Everything needed to create a container.
#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    pub image: String,
    pub cmd: Option<Vec<String>>,
    pub working_dir: Option<String>,
    /// `KEY=value` pairs
    pub env: Option<Vec<String>>,
    pub labels: Option<HashMap<String, String>>,
    /// Binds, extra hosts and auto-remove
    pub host_config: HostConfig,
}

impl ContainerConfig {
    pub fn builder() -> ContainerConfigBuilder {
        ContainerConfigBuilder::default()
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn working_dir(&self) -> Option<&str> {
        self.working_dir.as_deref()
    }

    /// Bind specifications, `host:container[:mode]`.
    pub fn binds(&self) -> &[String] {
        self.host_config.binds.as_deref().unwrap_or_default()
    }

    /// `/etc/hosts` entries, `host:ip`.
    pub fn extra_hosts(&self) -> &[String] {
        self.host_config.extra_hosts.as_deref().unwrap_or_default()
    }
}

/// Fluent builder for [`ContainerConfig`].
#[derive(Default)]
pub struct ContainerConfigBuilder {
    config: ContainerConfig,
}

fn push(list: &mut Option<Vec<String>>, item: String) {
    list.get_or_insert_with(Vec::new).push(item);
}

impl ContainerConfigBuilder {
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.config.image = image.into();
        self
    }

    /// Main process command line.
    pub fn cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.cmd = Some(cmd.into_iter().map(Into::into).collect());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        push(
            &mut self.config.env,
            format!("{}={}", key.into(), value.into()),
        );
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .labels
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Add a bind mount, `host_path:container_path[:mode]`.
    pub fn bind(mut self, bind: impl Into<String>) -> Self {
        push(&mut self.config.host_config.binds, bind.into());
        self
    }

    /// Map `host` to `addr` in the container's `/etc/hosts`.
    pub fn extra_host(mut self, host: impl Into<String>, addr: impl Into<String>) -> Self {
        push(
            &mut self.config.host_config.extra_hosts,
            format!("{}:{}", host.into(), addr.into()),
        );
        self
    }

    /// Have the daemon remove the container once it stops.
    pub fn auto_remove(mut self, enable: bool) -> Self {
        self.config.host_config.auto_remove = Some(enable);
        self
    }

    /// # Errors
    ///
    /// Returns [`ContainerError::ConfigError`] for a blank image or a bind
    /// without a container path.
    pub fn build(self) -> Result<ContainerConfig> {
        if self.config.image.trim().is_empty() {
            return Err(ContainerError::ConfigError("Image is required".to_string()));
        }
        if let Some(bad) = self
            .config
            .binds()
            .iter()
            .find(|bind| !bind.contains(':'))
        {
            return Err(ContainerError::ConfigError(format!(
                "Invalid bind specification: {}",
                bad
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_config() {
        let config = ContainerConfig::builder()
            .image("python:3-slim")
            .cmd(vec!["sleep", "infinity"])
            .working_dir("/workspace")
            .env("PYTHONPATH", "/workspace")
            .label("dockexec.managed", "true")
            .build()
            .unwrap();

        assert_eq!(config.image(), "python:3-slim");
        assert_eq!(config.working_dir(), Some("/workspace"));
        assert_eq!(config.env, Some(vec!["PYTHONPATH=/workspace".to_string()]));
        assert_eq!(
            config
                .labels
                .as_ref()
                .unwrap()
                .get("dockexec.managed")
                .map(String::as_str),
            Some("true")
        );
        assert_eq!(config.host_config.auto_remove, None);
        assert!(config.binds().is_empty());
    }

    #[test]
    fn test_binds_and_hosts_keep_order() {
        let config = ContainerConfig::builder()
            .image("python:3-slim")
            .bind("/host/path:/workspace:rw")
            .bind("/data/file.txt:/container/file.txt:ro")
            .extra_host("example.com", "127.0.0.1")
            .auto_remove(true)
            .build()
            .unwrap();

        assert_eq!(
            config.binds(),
            &[
                "/host/path:/workspace:rw".to_string(),
                "/data/file.txt:/container/file.txt:ro".to_string()
            ]
        );
        assert_eq!(config.extra_hosts(), &["example.com:127.0.0.1".to_string()]);
        assert_eq!(config.host_config.auto_remove, Some(true));
    }

    #[test]
    fn test_build_validation() {
        assert!(matches!(
            ContainerConfig::builder().cmd(vec!["echo"]).build(),
            Err(ContainerError::ConfigError(_))
        ));
        assert!(matches!(
            ContainerConfig::builder().image("  ").build(),
            Err(ContainerError::ConfigError(_))
        ));
        assert!(matches!(
            ContainerConfig::builder()
                .image("python:3-slim")
                .bind("just-a-path")
                .build(),
            Err(ContainerError::ConfigError(_))
        ));
    }
}
