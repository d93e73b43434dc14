//! # dockexec
//!
//! Sandboxed execution of code blocks inside Docker/Podman containers.
//!
//! A caller hands the executor an ordered batch of code blocks. Each block is
//! written into a host working directory that is bind-mounted into a
//! long-lived container, then run with the language's interpreter under a
//! per-block timeout. The batch stops at the first failure and can be
//! cancelled cooperatively from another task.
//!
//! ## Architecture Overview
//!
//! - **[`executor`]**: Batch execution, file naming and containment, lifecycle
//! - **[`container`]**: Docker/Podman client, container orchestration, exec
//! - **[`cli`]**: The `dockexec` binary's argument parsing and config discovery
//! - **[`env`]**: Defaults, sentinel exit codes and diagnostic strings
//!
//! ## Features
//!
//! ### Sandboxing
//! - **Workspace Containment**: Code files may only be written inside the work dir
//! - **Timeouts**: Enforced in the container and backstopped from the host
//! - **Cancellation**: `CancellationToken` kills the running block and aborts the batch
//!
//! ### Lifecycle
//! - **Scoped Acquisition**: [`DockerCommandLineCodeExecutor::scoped`] always stops the container
//! - **Attach or Create**: Reuse a container by fixed name, or create a fresh one
//! - **Ephemeral Workspaces**: A temporary work dir is created and removed automatically
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dockexec::{CodeBlock, DockerCommandLineCodeExecutor, ExecutorConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut executor = DockerCommandLineCodeExecutor::new(ExecutorConfig::default())?;
//!     executor.start().await?;
//!
//!     let result = executor
//!         .execute_code_blocks(
//!             &[CodeBlock::new("python", "print('hello world!')")],
//!             &CancellationToken::new(),
//!         )
//!         .await?;
//!     println!("{}", result.output);
//!
//!     executor.stop().await?;
//!     Ok(())
//! }
//! ```

/// Container runtime integration.
///
/// Docker/Podman connection, container creation and lifecycle, and command
/// execution with bounded output capture.
pub mod container;

/// Sandboxed code execution.
///
/// The Docker command-line executor, its configuration and the pure helpers
/// for file naming and workspace containment.
pub mod executor;

/// Command-line interface support.
pub mod cli;

/// Environment constants and path utilities.
pub mod env;

pub use container::{ContainerError, ContainerOrchestrator, ContainerRuntime};
pub use executor::{
    CodeBlock, CodeResult, ComponentModel, DockerCommandLineCodeExecutor, ExecutorConfig,
    ExecutorError, VolumeBinding,
};
