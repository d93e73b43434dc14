//! Docker command-line code executor.
//!
//! Owns one container and a host working directory bind-mounted at
//! `/workspace`. Code blocks are written into the workspace and run with the
//! language's interpreter, one at a time, each bounded by the configured
//! timeout and by the caller's [`CancellationToken`].

use super::config::{ComponentModel, DOCKER_EXECUTOR_PROVIDER, ExecutorConfig};
use super::workspace::{self, LanguageSpec};
use super::{CodeBlock, CodeResult, ExecutorError};
use crate::container::{
    ContainerConfig, ContainerError, ContainerOrchestrator, ContainerRuntime, ContainerState,
    ExecConfig, ExecOutput,
};
use crate::env::{self, messages};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Extra time the host waits beyond the in-container `timeout` before killing the block itself.
const HOST_DEADLINE_GRACE: Duration = Duration::from_secs(1);

/// Upper bound for the kill exec issued after a timeout or cancellation.
const KILL_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable carrying the code file path to the kill script.
const KILL_TARGET_ENV: &str = "DOCKEXEC_KILL_TARGET";

/// Kills every process with `$DOCKEXEC_KILL_TARGET` as one of its arguments, except itself.
const KILL_SCRIPT: &str = r#"for p in /proc/[0-9]*; do
  pid=${p#/proc/}
  [ "$pid" = "$$" ] && continue
  if tr '\0' '\n' < "$p/cmdline" 2>/dev/null | grep -qxF -- "$DOCKEXEC_KILL_TARGET"; then
    kill -9 "$pid" 2>/dev/null
  fi
done
exit 0"#;

/// Lifecycle of the executor's container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorState {
    /// `start()` has not been called yet
    NotStarted,
    /// A container is running and owned by this executor
    Running {
        /// ID of the owned container
        container_id: String,
    },
    /// The container was stopped; `start()` may be called again
    Stopped,
}

/// How a single block's execution ended.
enum BlockOutcome {
    Finished(ExecOutput),
    TimedOut(ExecOutput),
    Cancelled,
}

/// Output accumulated across the blocks of one batch.
#[derive(Default)]
struct BatchOutput {
    output: String,
    code_file: Option<PathBuf>,
    truncated: bool,
}

impl BatchOutput {
    fn append(&mut self, output: &ExecOutput) {
        self.output.push_str(&output.combined());
        self.truncated |= output.truncated;
    }

    fn finish(self, exit_code: i32) -> CodeResult {
        CodeResult {
            exit_code,
            output: self.output,
            code_file: self.code_file,
            output_truncated: self.truncated,
        }
    }

    fn fail(mut self, exit_code: i32, diagnostic: &str) -> CodeResult {
        if !self.output.is_empty() && !self.output.ends_with('\n') {
            self.output.push('\n');
        }
        self.output.push_str(diagnostic);
        self.finish(exit_code)
    }
}

/// Executes code blocks inside a Docker/Podman container.
///
/// One batch runs at a time: every operation that touches the container takes
/// `&mut self`. Use separate executors for concurrent work.
pub struct DockerCommandLineCodeExecutor {
    config: ExecutorConfig,
    container_name: String,
    /// Absolute form of the configured work_dir
    configured_work_dir: Option<PathBuf>,
    /// Auto-created workspace, alive only while running
    ephemeral_work_dir: Option<TempDir>,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    state: ExecutorState,
}

impl DockerCommandLineCodeExecutor {
    /// Create an executor that connects to the local Docker/Podman daemon on `start()`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::InvalidTimeout`] for a zero timeout, or an I/O
    /// error if the configured working directory cannot be created.
    pub fn new(config: ExecutorConfig) -> Result<Self, ExecutorError> {
        config.validate()?;

        let configured_work_dir = match &config.work_dir {
            Some(dir) => Some(prepare_work_dir(dir)?),
            None => None,
        };

        let container_name = config.container_name.clone().unwrap_or_else(|| {
            format!("{}-{}", env::container::NAME_PREFIX, uuid::Uuid::new_v4())
        });

        Ok(Self {
            config,
            container_name,
            configured_work_dir,
            ephemeral_work_dir: None,
            runtime: None,
            state: ExecutorState::NotStarted,
        })
    }

    /// Create an executor that uses the given container runtime.
    pub fn with_runtime(
        config: ExecutorConfig,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self, ExecutorError> {
        let mut executor = Self::new(config)?;
        executor.runtime = Some(runtime);
        Ok(executor)
    }

    /// Rebuild a not-yet-started executor from a dumped component.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::UnsupportedComponent`] if the model was produced
    /// by a different provider, or a validation error for its configuration.
    pub fn load_component(model: &ComponentModel) -> Result<Self, ExecutorError> {
        if model.provider != DOCKER_EXECUTOR_PROVIDER {
            return Err(ExecutorError::UnsupportedComponent(model.provider.clone()));
        }
        Self::new(model.config.clone())
    }

    /// Dump the configuration as a component model.
    pub fn dump_component(&self) -> ComponentModel {
        ComponentModel::docker_executor(self.config.clone())
    }

    /// The executor's configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Per-block timeout in seconds.
    pub fn timeout(&self) -> u64 {
        self.config.timeout
    }

    /// Whether code files are deleted after each block.
    pub fn delete_tmp_files(&self) -> bool {
        self.config.delete_tmp_files
    }

    /// Name of the container this executor creates or attaches to.
    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &ExecutorState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ExecutorState::Running { .. })
    }

    /// Host working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::WorkDirNotInitialized`] when no directory was
    /// configured and the executor has not been started.
    pub fn work_dir(&self) -> Result<&Path, ExecutorError> {
        self.configured_work_dir
            .as_deref()
            .or_else(|| self.ephemeral_work_dir.as_ref().map(TempDir::path))
            .ok_or(ExecutorError::WorkDirNotInitialized)
    }

    /// Path handed to the runtime as the workspace mount source.
    pub fn bind_dir(&self) -> Result<PathBuf, ExecutorError> {
        match &self.config.bind_dir {
            Some(dir) => Ok(dir.clone()),
            None => self.work_dir().map(Path::to_path_buf),
        }
    }

    async fn connect(&mut self) -> Result<Arc<dyn ContainerRuntime>, ExecutorError> {
        if let Some(runtime) = &self.runtime {
            return Ok(runtime.clone());
        }
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(ContainerOrchestrator::new().await?);
        self.runtime = Some(runtime.clone());
        Ok(runtime)
    }

    /// Create (or attach to) the container and run the init command.
    ///
    /// Calling `start()` on a running executor is a no-op.
    ///
    /// # Errors
    ///
    /// Container creation, start, readiness and init failures are returned as-is;
    /// nothing is retried and any partially created container is torn down.
    pub async fn start(&mut self) -> Result<(), ExecutorError> {
        if self.is_running() {
            debug!("Executor container {} already running", self.container_name);
            return Ok(());
        }

        let runtime = self.connect().await?;

        if self.configured_work_dir.is_none() {
            let dir = tempfile::Builder::new().prefix("dockexec-").tempdir()?;
            debug!("Created ephemeral work dir {}", dir.path().display());
            self.ephemeral_work_dir = Some(dir);
        }

        match self.launch(runtime.as_ref()).await {
            Ok(container_id) => {
                info!(
                    "Executor container {} running ({})",
                    self.container_name,
                    container_id.get(..12).unwrap_or(container_id.as_str())
                );
                self.state = ExecutorState::Running { container_id };
                Ok(())
            }
            Err(e) => {
                self.discard_ephemeral_work_dir();
                Err(e)
            }
        }
    }

    async fn launch(&self, runtime: &dyn ContainerRuntime) -> Result<String, ExecutorError> {
        runtime.ensure_image(&self.config.image).await?;

        let container_id = match self.attach_existing(runtime).await? {
            Some(id) => id,
            None => {
                let container_config = self.container_config()?;
                let id = runtime
                    .create_container(&container_config, &self.container_name)
                    .await?;
                if let Err(e) = runtime.start_container(&id).await {
                    teardown(runtime, &id, true).await.ok();
                    return Err(e.into());
                }
                id
            }
        };

        if let Err(e) = self.prepare(runtime, &container_id).await {
            if let Err(cleanup) = teardown(runtime, &container_id, self.config.auto_remove).await {
                warn!("Failed to clean up container {}: {}", container_id, cleanup);
            }
            return Err(e);
        }

        Ok(container_id)
    }

    /// Reuse a container with the configured fixed name, if one exists.
    async fn attach_existing(
        &self,
        runtime: &dyn ContainerRuntime,
    ) -> Result<Option<String>, ExecutorError> {
        if self.config.container_name.is_none() {
            return Ok(None);
        }
        let Some(id) = runtime.find_container(&self.container_name).await? else {
            return Ok(None);
        };

        info!("Attaching to existing container {}", self.container_name);
        if runtime.container_state(&id).await? != ContainerState::Running {
            runtime.start_container(&id).await?;
        }
        Ok(Some(id))
    }

    fn container_config(&self) -> Result<ContainerConfig, ExecutorError> {
        let workspace = env::container::WORKSPACE_MOUNT;
        let bind_dir = self.bind_dir()?;

        let mut builder = ContainerConfig::builder()
            .image(&self.config.image)
            .cmd(vec!["sleep", "infinity"])
            .working_dir(workspace)
            .env("PYTHONPATH", workspace)
            .label("dockexec.managed", "true")
            .bind(format!("{}:{}:rw", bind_dir.display(), workspace))
            .auto_remove(self.config.auto_remove);

        for (host_path, binding) in &self.config.extra_volumes {
            builder = builder.bind(format!("{}:{}:{}", host_path, binding.bind, binding.mode));
        }
        for (host, addr) in &self.config.extra_hosts {
            builder = builder.extra_host(host, addr);
        }

        Ok(builder.build()?)
    }

    /// Wait for the container to run, then run the init command.
    async fn prepare(
        &self,
        runtime: &dyn ContainerRuntime,
        container_id: &str,
    ) -> Result<(), ExecutorError> {
        wait_for_ready(
            runtime,
            container_id,
            Duration::from_secs(env::container::READY_TIMEOUT_SECS),
        )
        .await?;

        if let Some(init_command) = &self.config.init_command {
            debug!("Running init command: {}", init_command);
            let exec = ExecConfig::builder()
                .cmd(vec!["sh", "-c", init_command.as_str()])
                .working_dir(env::container::WORKSPACE_MOUNT)
                .build();
            let output = runtime.exec(container_id, &exec).await?;
            if !output.success() {
                warn!(
                    "Init command exited with {:?}: {}",
                    output.exit_code,
                    output.combined().trim_end()
                );
            }
        }
        Ok(())
    }

    /// Stop (and, with `auto_remove`, remove) the container and drop the
    /// ephemeral working directory. Safe to call any number of times.
    ///
    /// # Errors
    ///
    /// Runtime errors other than "already stopped/removed" are returned after
    /// local cleanup has been done.
    pub async fn stop(&mut self) -> Result<(), ExecutorError> {
        let container_id = match std::mem::replace(&mut self.state, ExecutorState::Stopped) {
            ExecutorState::Running { container_id } => Some(container_id),
            previous => {
                self.state = previous;
                None
            }
        };

        let result = match (container_id, self.runtime.clone()) {
            (Some(container_id), Some(runtime)) => {
                info!("Stopping executor container {}", self.container_name);
                teardown(runtime.as_ref(), &container_id, self.config.auto_remove).await
            }
            _ => Ok(()),
        };

        self.discard_ephemeral_work_dir();
        result.map_err(ExecutorError::from)
    }

    /// Restart the running container in place, keeping the workspace.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::NotStarted`] if the executor is not running.
    pub async fn restart(&mut self) -> Result<(), ExecutorError> {
        let (container_id, runtime) = self.running_container()?;
        info!("Restarting executor container {}", self.container_name);
        runtime.restart_container(&container_id).await?;
        self.prepare(runtime.as_ref(), &container_id).await
    }

    /// Run `f` between `start()` and `stop()`.
    ///
    /// `stop()` runs on every exit path of `f`, including a panic, which is
    /// resumed once the container has been stopped.
    ///
    /// # Errors
    ///
    /// Returns the error from `start()` or `stop()`; `f`'s own result is passed
    /// through as `T`.
    pub async fn scoped<T, F>(&mut self, f: F) -> Result<T, ExecutorError>
    where
        F: for<'a> FnOnce(&'a mut Self) -> BoxFuture<'a, T>,
    {
        self.start().await?;
        let outcome = AssertUnwindSafe(f(self)).catch_unwind().await;
        let stopped = self.stop().await;

        match outcome {
            Ok(value) => stopped.map(|()| value),
            Err(panic) => {
                if let Err(e) = stopped {
                    warn!("Failed to stop executor after panic: {}", e);
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    fn running_container(&self) -> Result<(String, Arc<dyn ContainerRuntime>), ExecutorError> {
        match (&self.state, &self.runtime) {
            (ExecutorState::Running { container_id }, Some(runtime)) => {
                Ok((container_id.clone(), runtime.clone()))
            }
            _ => Err(ExecutorError::NotStarted),
        }
    }

    fn discard_ephemeral_work_dir(&mut self) {
        if let Some(dir) = self.ephemeral_work_dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!("Removed ephemeral work dir {}", path.display()),
                Err(e) => warn!("Failed to remove work dir {}: {}", path.display(), e),
            }
        }
    }

    /// Execute `blocks` in order, stopping at the first failure.
    ///
    /// Failures caused by the code itself (nonzero exit, timeout, cancellation,
    /// files outside the workspace, unsupported languages) are reported in the
    /// returned [`CodeResult`].
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::NoCodeBlocks`] for an empty batch,
    /// [`ExecutorError::NotStarted`] before `start()`, and runtime or I/O errors.
    pub async fn execute_code_blocks(
        &mut self,
        blocks: &[CodeBlock],
        cancellation: &CancellationToken,
    ) -> Result<CodeResult, ExecutorError> {
        if blocks.is_empty() {
            return Err(ExecutorError::NoCodeBlocks);
        }
        let (container_id, runtime) = self.running_container()?;
        let work_dir = self.work_dir()?.to_path_buf();

        let mut batch = BatchOutput::default();

        for (index, block) in blocks.iter().enumerate() {
            if cancellation.is_cancelled() {
                return Ok(batch.fail(env::executor::CANCELLED_EXIT_CODE, messages::CANCELLED));
            }

            let Some(spec) = workspace::language_spec(&block.language) else {
                return Ok(batch.fail(
                    env::executor::POLICY_EXIT_CODE,
                    &format!("Unsupported language: {}", block.language),
                ));
            };

            let code = workspace::silence_pip(&block.code, &block.language);
            let filename = workspace::code_file_name(&code, spec);
            let Some(host_path) = workspace::resolve_on_disk(&work_dir, &filename) else {
                warn!("Rejected code file outside the workspace: {}", filename);
                return Ok(batch.fail(env::executor::POLICY_EXIT_CODE, messages::NOT_IN_WORKSPACE));
            };

            if let Some(parent) = host_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&host_path, code.as_bytes()).await?;
            debug!(
                "Block {} ({}) written to {}",
                index,
                block.language,
                host_path.display()
            );

            let container_path = container_path_for(&work_dir, &host_path);
            let outcome = self
                .run_block(runtime.as_ref(), &container_id, spec, &container_path, cancellation)
                .await;

            if self.config.delete_tmp_files {
                remove_code_file(&host_path).await;
            }
            batch.code_file = Some(host_path);

            match outcome? {
                BlockOutcome::Finished(output) => {
                    batch.append(&output);
                    let exit_code = output.exit_code.map_or(-1, |code| code as i32);
                    if exit_code != 0 {
                        debug!("Block {} failed with exit code {}", index, exit_code);
                        return Ok(batch.finish(exit_code));
                    }
                }
                BlockOutcome::TimedOut(output) => {
                    batch.append(&output);
                    return Ok(batch.fail(
                        env::executor::TIMEOUT_EXIT_CODE,
                        &format!(
                            "{}: code block exceeded {} seconds",
                            messages::TIMEOUT,
                            self.config.timeout
                        ),
                    ));
                }
                BlockOutcome::Cancelled => {
                    return Ok(batch.fail(env::executor::CANCELLED_EXIT_CODE, messages::CANCELLED));
                }
            }
        }

        Ok(batch.finish(0))
    }

    /// Run one code file, racing it against the deadline and the cancellation token.
    async fn run_block(
        &self,
        runtime: &dyn ContainerRuntime,
        container_id: &str,
        spec: LanguageSpec,
        container_path: &str,
        cancellation: &CancellationToken,
    ) -> Result<BlockOutcome, ExecutorError> {
        let timeout_secs = self.config.timeout.to_string();
        let exec = ExecConfig::builder()
            .cmd(vec![
                "timeout",
                timeout_secs.as_str(),
                spec.interpreter,
                container_path,
            ])
            .working_dir(env::container::WORKSPACE_MOUNT)
            .max_output_bytes(self.config.max_output_bytes)
            .build();

        let deadline =
            Duration::from_secs(self.config.timeout).saturating_add(HOST_DEADLINE_GRACE);
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = cancellation.cancelled() => BlockOutcome::Cancelled,
            result = runtime.exec(container_id, &exec) => {
                let output = result?;
                if output.exit_code == Some(i64::from(env::executor::TIMEOUT_EXIT_CODE)) {
                    BlockOutcome::TimedOut(output)
                } else {
                    BlockOutcome::Finished(output)
                }
            }
            _ = tokio::time::sleep(deadline) => BlockOutcome::TimedOut(ExecOutput::default()),
        };

        match &outcome {
            BlockOutcome::Finished(output) => {
                debug!(
                    "{} finished in {:?} with exit code {:?}",
                    container_path,
                    started.elapsed(),
                    output.exit_code
                );
            }
            BlockOutcome::TimedOut(_) => {
                warn!("{} timed out after {:?}", container_path, started.elapsed());
                kill_block(runtime, container_id, container_path).await;
            }
            BlockOutcome::Cancelled => {
                info!("{} cancelled after {:?}", container_path, started.elapsed());
                kill_block(runtime, container_id, container_path).await;
            }
        }

        Ok(outcome)
    }
}

impl Drop for DockerCommandLineCodeExecutor {
    fn drop(&mut self) {
        if !self.config.stop_container {
            return;
        }
        let ExecutorState::Running { container_id } =
            std::mem::replace(&mut self.state, ExecutorState::Stopped)
        else {
            return;
        };
        let Some(runtime) = self.runtime.take() else {
            return;
        };

        let auto_remove = self.config.auto_remove;
        let work_dir = self.ephemeral_work_dir.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = teardown(runtime.as_ref(), &container_id, auto_remove).await {
                        warn!("Failed to stop container {} on drop: {}", container_id, e);
                    }
                    drop(work_dir);
                });
            }
            Err(_) => {
                warn!(
                    "Executor dropped outside a Tokio runtime; container {} left running",
                    container_id
                );
            }
        }
    }
}

/// Create the configured work dir and return its absolute form.
fn prepare_work_dir(dir: &Path) -> Result<PathBuf, ExecutorError> {
    std::fs::create_dir_all(dir)?;
    let absolute = std::path::absolute(dir)?;

    let is_cwd = dir == Path::new(".")
        || std::env::current_dir()
            .map(|cwd| cwd == absolute)
            .unwrap_or(false);
    if is_cwd {
        warn!("{}", messages::CWD_DEPRECATED);
    }

    Ok(absolute)
}

/// Map a host file under `work_dir` to its path inside the container.
fn container_path_for(work_dir: &Path, host_path: &Path) -> String {
    let relative = host_path.strip_prefix(work_dir).unwrap_or(host_path);
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("{}/{}", env::container::WORKSPACE_MOUNT, parts.join("/"))
}

async fn remove_code_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Deleted code file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete code file {}: {}", path.display(), e),
    }
}

async fn wait_for_ready(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
    timeout: Duration,
) -> Result<(), ContainerError> {
    let started = Instant::now();
    loop {
        let state = runtime.container_state(container_id).await?;
        if state == ContainerState::Running {
            return Ok(());
        }
        if started.elapsed() >= timeout {
            return Err(ContainerError::Other(format!(
                "Container {} did not become ready within {:?} (state: {:?})",
                container_id, timeout, state
            )));
        }
        tokio::time::sleep(Duration::from_millis(env::container::READY_POLL_MILLIS)).await;
    }
}

/// Stop and optionally remove a container, treating "already gone" as success.
async fn teardown(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
    remove: bool,
) -> Result<(), ContainerError> {
    match runtime.stop_container(container_id).await {
        Ok(()) => {}
        Err(e) if e.is_gone() => debug!("Container {} already stopped: {}", container_id, e),
        Err(e) => return Err(e),
    }

    if remove {
        match runtime.remove_container(container_id, true).await {
            Ok(()) => {}
            Err(e) if e.is_gone() => debug!("Container {} already removed: {}", container_id, e),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Kill the in-container processes running `container_path`.
async fn kill_block(runtime: &dyn ContainerRuntime, container_id: &str, container_path: &str) {
    let exec = ExecConfig::builder()
        .cmd(vec!["sh", "-c", KILL_SCRIPT])
        .env(KILL_TARGET_ENV, container_path)
        .build();

    match tokio::time::timeout(KILL_TIMEOUT, runtime.exec(container_id, &exec)).await {
        Ok(Ok(_)) => debug!("Killed processes for {}", container_path),
        Ok(Err(e)) => warn!("Failed to kill processes for {}: {}", container_path, e),
        Err(_) => warn!("Timed out killing processes for {}", container_path),
    }
}
