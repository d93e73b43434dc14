//! Environment constants and path utilities for dockexec.
//!
//! This module centralizes the hardcoded names, defaults and diagnostic strings
//! used throughout the crate, making them easier to maintain and modify.

use std::path::{Path, PathBuf};

/// Main application directory name (hidden directory like .git, .vscode)
pub const DOCKEXEC_DIR_NAME: &str = ".dockexec";

/// Configuration file name inside [`DOCKEXEC_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file name looked up in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "dockexec.toml";

/// Container-related defaults
pub mod container {
    /// Image used when none is configured
    pub const DEFAULT_IMAGE: &str = "python:3-slim";

    /// Mount point of the workspace inside the container
    pub const WORKSPACE_MOUNT: &str = "/workspace";

    /// Prefix for generated container names
    pub const NAME_PREFIX: &str = "dockexec";

    /// Seconds to wait for a freshly started container to report running
    pub const READY_TIMEOUT_SECS: u64 = 60;

    /// Poll interval while waiting for a container to become ready
    pub const READY_POLL_MILLIS: u64 = 100;

    /// Grace period (seconds) given to `docker stop` before SIGKILL
    pub const STOP_TIMEOUT_SECS: i32 = 10;
}

/// Executor defaults and sentinel values
pub mod executor {
    /// Default per-block timeout in seconds
    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

    /// Default name of the importable functions module
    pub const DEFAULT_FUNCTIONS_MODULE: &str = "functions";

    /// Default per-block output cap in bytes
    pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

    /// Exit code reported when a block exceeds its timeout (matches coreutils `timeout`)
    pub const TIMEOUT_EXIT_CODE: i32 = 124;

    /// Exit code reported when a batch is cancelled
    pub const CANCELLED_EXIT_CODE: i32 = 130;

    /// Exit code reported for sandbox policy violations and unsupported languages
    pub const POLICY_EXIT_CODE: i32 = 1;

    /// Prefix of generated code file names
    pub const TMP_CODE_PREFIX: &str = "tmp_code_";
}

/// Diagnostic strings that callers pattern-match on
pub mod messages {
    pub const TIMEOUT: &str = "Timeout";
    pub const CANCELLED: &str = "Code execution was cancelled";
    pub const NOT_IN_WORKSPACE: &str = "Filename is not in the workspace";
    pub const NO_CODE_BLOCKS: &str = "No code blocks to execute";
    pub const INVALID_TIMEOUT: &str = "Timeout must be greater than or equal to 1.";
    pub const WORK_DIR_NOT_INITIALIZED: &str = "Working directory not properly initialized";
    pub const CWD_DEPRECATED: &str = "Using the current directory as work_dir is deprecated.";
}

/// Build the dockexec directory path in user's home directory
pub fn user_config_dir_path(home_dir: &Path) -> PathBuf {
    home_dir.join(DOCKEXEC_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    user_config_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build local config file path in current directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(LOCAL_CONFIG_FILE_NAME)
}
