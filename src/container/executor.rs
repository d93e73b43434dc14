//! One-shot commands inside a running container.

use crate::container::{ContainerError, Result};
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecResults};
use futures::stream::StreamExt;
use tracing::debug;

/// A command to run with `docker exec`.
#[derive(Debug, Clone, Default)]
pub struct ExecConfig {
    cmd: Vec<String>,
    env: Vec<String>,
    working_dir: Option<String>,
    max_output_bytes: Option<usize>,
}

impl ExecConfig {
    pub fn builder() -> ExecConfigBuilder {
        ExecConfigBuilder::default()
    }

    pub fn cmd(&self) -> &[String] {
        &self.cmd
    }

    /// `KEY=value` pairs added to the exec environment.
    pub fn env(&self) -> &[String] {
        &self.env
    }

    pub fn working_dir(&self) -> Option<&str> {
        self.working_dir.as_deref()
    }

    pub fn max_output_bytes(&self) -> Option<usize> {
        self.max_output_bytes
    }

    fn to_options(&self) -> CreateExecOptions<String> {
        CreateExecOptions {
            cmd: Some(self.cmd.clone()),
            env: (!self.env.is_empty()).then(|| self.env.clone()),
            working_dir: self.working_dir.clone(),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        }
    }
}

/// Fluent builder for [`ExecConfig`].
#[derive(Default)]
pub struct ExecConfigBuilder {
    config: ExecConfig,
}

impl ExecConfigBuilder {
    pub fn cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.cmd = cmd.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .env
            .push(format!("{}={}", key.into(), value.into()));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.working_dir = Some(dir.into());
        self
    }

    /// Keep at most `limit` bytes of output. Anything past it is read and discarded.
    pub fn max_output_bytes(mut self, limit: usize) -> Self {
        self.config.max_output_bytes = Some(limit);
        self
    }

    pub fn build(self) -> ExecConfig {
        self.config
    }
}

/// Captured result of an exec.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    /// Both streams in arrival order
    pub interleaved: String,
    /// `None` when the daemon did not report one
    pub exit_code: Option<i64>,
    pub truncated: bool,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Both streams as the process wrote them.
    pub fn combined(&self) -> String {
        if self.interleaved.is_empty() {
            format!("{}{}", self.stdout, self.stderr)
        } else {
            self.interleaved.clone()
        }
    }
}

/// Builds an [`ExecOutput`] from stream chunks, stopping at a byte cap.
#[derive(Debug, Default)]
pub(crate) struct OutputCollector {
    output: ExecOutput,
    kept: usize,
    limit: Option<usize>,
}

impl OutputCollector {
    pub(crate) fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    pub(crate) fn push(&mut self, text: &str, is_stderr: bool) {
        if self.output.truncated {
            return;
        }
        let text = match self.limit {
            Some(limit) if self.kept + text.len() > limit => {
                self.output.truncated = true;
                let mut end = limit.saturating_sub(self.kept);
                while end > 0 && !text.is_char_boundary(end) {
                    end -= 1;
                }
                &text[..end]
            }
            _ => text,
        };
        if text.is_empty() {
            return;
        }

        self.kept += text.len();
        let stream = if is_stderr {
            &mut self.output.stderr
        } else {
            &mut self.output.stdout
        };
        stream.push_str(text);
        self.output.interleaved.push_str(text);
    }

    pub(crate) fn finish(mut self, exit_code: Option<i64>) -> ExecOutput {
        self.output.exit_code = exit_code;
        self.output
    }
}

/// Run `config` in `container_id` and wait for it to exit.
///
/// # Errors
///
/// Returns [`ContainerError::ExecutionError`] if the output stream breaks or
/// the daemon detaches, and [`ContainerError::ApiError`] for daemon failures.
pub async fn execute(docker: &Docker, container_id: &str, config: &ExecConfig) -> Result<ExecOutput> {
    debug!("exec in {}: {:?}", container_id, config.cmd);

    let exec_id = docker
        .create_exec(container_id, config.to_options())
        .await?
        .id;

    let StartExecResults::Attached { mut output, .. } = docker.start_exec(&exec_id, None).await?
    else {
        return Err(ContainerError::ExecutionError(
            "Exec started detached".to_string(),
        ));
    };

    let mut collector = OutputCollector::new(config.max_output_bytes);
    while let Some(chunk) = output.next().await {
        let chunk = chunk
            .map_err(|e| ContainerError::ExecutionError(format!("Exec output stream failed: {}", e)))?;
        match chunk {
            LogOutput::StdOut { message } | LogOutput::Console { message } => {
                collector.push(&String::from_utf8_lossy(&message), false)
            }
            LogOutput::StdErr { message } => {
                collector.push(&String::from_utf8_lossy(&message), true)
            }
            LogOutput::StdIn { .. } => {}
        }
    }

    let exit_code = docker.inspect_exec(&exec_id).await?.exit_code;
    debug!("exec {} exited with {:?}", exec_id, exit_code);
    Ok(collector.finish(exit_code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_options() {
        let config = ExecConfig::builder()
            .cmd(vec!["timeout", "60", "python", "tmp_code_x.py"])
            .env("FOO", "bar")
            .working_dir("/workspace")
            .max_output_bytes(16)
            .build();

        assert_eq!(config.cmd(), &["timeout", "60", "python", "tmp_code_x.py"]);
        assert_eq!(config.max_output_bytes(), Some(16));

        let options = config.to_options();
        assert_eq!(options.env, Some(vec!["FOO=bar".to_string()]));
        assert_eq!(options.working_dir.as_deref(), Some("/workspace"));
        assert_eq!(options.attach_stdout, Some(true));
        assert_eq!(options.attach_stderr, Some(true));
    }

    #[test]
    fn test_empty_env_is_omitted() {
        let options = ExecConfig::builder().cmd(vec!["true"]).build().to_options();
        assert_eq!(options.env, None);
        assert_eq!(options.working_dir, None);
    }

    #[test]
    fn test_exec_output_status() {
        let ok = ExecOutput {
            stdout: "hello\n".to_string(),
            exit_code: Some(0),
            ..Default::default()
        };
        assert!(ok.success());
        assert_eq!(ok.combined(), "hello\n");

        let failed = ExecOutput {
            stderr: "error\n".to_string(),
            exit_code: Some(1),
            ..Default::default()
        };
        assert!(!failed.success());
        assert_eq!(failed.combined(), "error\n");

        assert!(!ExecOutput::default().success());
    }

    #[test]
    fn test_collector_keeps_arrival_order() {
        let mut collector = OutputCollector::new(None);
        collector.push("out1\n", false);
        collector.push("err1\n", true);
        collector.push("out2\n", false);
        let output = collector.finish(Some(0));

        assert_eq!(output.stdout, "out1\nout2\n");
        assert_eq!(output.stderr, "err1\n");
        assert_eq!(output.combined(), "out1\nerr1\nout2\n");
        assert!(!output.truncated);
    }

    #[test]
    fn test_collector_truncates_on_char_boundary() {
        let mut collector = OutputCollector::new(Some(5));
        collector.push("abcd", false);
        collector.push("éé", false);
        collector.push("more", true);
        let output = collector.finish(Some(0));

        assert_eq!(output.combined(), "abcd");
        assert!(output.truncated);
    }
}
