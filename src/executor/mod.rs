//! # Sandboxed Code Execution
//!
//! Runs ordered batches of code blocks inside a Docker/Podman container with a
//! per-block timeout and cooperative cancellation.
//!
//! ## Core Components
//!
//! - **[`DockerCommandLineCodeExecutor`]**: Container lifecycle plus batch execution
//! - **[`ExecutorConfig`]**: Serializable configuration (image, timeout, mounts, ...)
//! - **[`ComponentModel`]**: Provider-tagged configuration used by dump/load
//! - **[`CodeBlock`]**: One unit of source text with its language tag
//! - **[`CodeResult`]**: Exit code, combined output and the last code file written
//!
//! ## Execution Flow
//!
//! ```text
//! Vec<CodeBlock>
//!        ↓
//!   for each block (in order)
//!        ↓
//!   file name (directive or content hash)
//!        ↓
//!   containment check ──✗──→ exit 1 "Filename is not in the workspace"
//!        ↓
//!   write to <work_dir>/<file>
//!        ↓
//!   exec `timeout <t> <interpreter> <file>` in /workspace
//!        ↓            ↓               ↓
//!     finished     deadline      cancellation
//!        ↓            ↓               ↓
//!   nonzero? stop  kill + 124     kill + 130
//!        ↓
//!    CodeResult
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use dockexec::executor::{CodeBlock, DockerCommandLineCodeExecutor, ExecutorConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExecutorConfig::default().with_timeout(30);
//!     let mut executor = DockerCommandLineCodeExecutor::new(config)?;
//!
//!     let result = executor
//!         .scoped(|executor| {
//!             Box::pin(async move {
//!                 let blocks = vec![
//!                     CodeBlock::new("python", "print('hello world!')"),
//!                     CodeBlock::new("python", "a = 100 + 100; print(a)"),
//!                 ];
//!                 executor
//!                     .execute_code_blocks(&blocks, &CancellationToken::new())
//!                     .await
//!             })
//!         })
//!         .await??;
//!
//!     println!("exit code {}: {}", result.exit_code, result.output);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Executor configuration and component (de)serialization.
pub mod config;

/// Docker command-line executor: lifecycle and batch execution.
pub mod docker;

/// File naming, language table and path containment.
pub mod workspace;

pub use config::{ComponentModel, ExecutorConfig, VolumeBinding};
pub use docker::DockerCommandLineCodeExecutor;

use crate::env::messages;

/// A unit of source text submitted for execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    /// Language tag, e.g. `python` or `bash`
    pub language: String,
    /// Source text
    pub code: String,
}

impl CodeBlock {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
        }
    }
}

/// Outcome of executing a batch of code blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeResult {
    /// 0 on success; the failing block's exit code, or a sentinel, otherwise
    pub exit_code: i32,
    /// Combined stdout/stderr of every attempted block, plus diagnostics
    pub output: String,
    /// Host path of the last code file written, if any
    pub code_file: Option<PathBuf>,
    /// Whether any block's output exceeded the configured cap
    pub output_truncated: bool,
}

impl CodeResult {
    /// Check if the whole batch succeeded
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors raised for API misuse and infrastructure failures.
///
/// Failures caused by the submitted code (nonzero exit, timeout, cancellation,
/// paths outside the workspace) are reported through [`CodeResult`] instead.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Timeout below one second
    #[error("{}", messages::INVALID_TIMEOUT)]
    InvalidTimeout,

    /// Empty batch
    #[error("{}", messages::NO_CODE_BLOCKS)]
    NoCodeBlocks,

    /// Working directory requested before it exists
    #[error("{}", messages::WORK_DIR_NOT_INITIALIZED)]
    WorkDirNotInitialized,

    /// Operation requires a running container
    #[error("Container is not running. Must first be started with start() or scoped().")]
    NotStarted,

    /// Component model from a different provider
    #[error("Unsupported component provider: {0}")]
    UnsupportedComponent(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Container runtime error
    #[error("Container error: {0}")]
    Container(#[from] crate::container::ContainerError),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ExecutorError::InvalidTimeout.to_string(),
            "Timeout must be greater than or equal to 1."
        );
        assert_eq!(
            ExecutorError::NoCodeBlocks.to_string(),
            "No code blocks to execute"
        );
        assert_eq!(
            ExecutorError::WorkDirNotInitialized.to_string(),
            "Working directory not properly initialized"
        );
    }

    #[test]
    fn test_code_result_success() {
        let result = CodeResult {
            exit_code: 0,
            output: "hello\n".to_string(),
            code_file: Some(PathBuf::from("/tmp/work/tmp_code_abc.py")),
            output_truncated: false,
        };
        assert!(result.success());
        assert!(!CodeResult { exit_code: 124, ..result }.success());
    }
}
