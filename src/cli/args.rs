//! Command line argument parsing
//!
//! This module handles CLI argument parsing with subcommands:
//! - `run`: Execute one or more code files as a batch inside the sandbox
//! - `show-config`: Print the effective executor configuration

use crate::executor::{CodeBlock, ExecutorConfig};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ExecutionMode {
    Run(RunConfig),
    ShowConfig(ShowConfigOptions),
}

impl ExecutionMode {
    pub fn verbose(&self) -> bool {
        match self {
            ExecutionMode::Run(config) => config.verbose,
            ExecutionMode::ShowConfig(options) => options.verbose,
        }
    }
}

#[derive(Debug)]
pub struct RunConfig {
    pub files: Vec<PathBuf>,
    pub language: Option<String>,
    pub config_override: Option<PathBuf>,
    pub overrides: ExecutorOverrides,
    pub verbose: bool,
}

/// Command-line values that take precedence over the configuration file.
#[derive(Debug, Default, Clone)]
pub struct ExecutorOverrides {
    pub image: Option<String>,
    pub timeout: Option<u64>,
    pub work_dir: Option<PathBuf>,
    pub container_name: Option<String>,
    pub init_command: Option<String>,
    pub delete_tmp_files: bool,
}

impl ExecutorOverrides {
    pub fn apply(&self, mut config: ExecutorConfig) -> ExecutorConfig {
        if let Some(image) = &self.image {
            config.image = image.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(work_dir) = &self.work_dir {
            config.work_dir = Some(work_dir.clone());
        }
        if let Some(name) = &self.container_name {
            config.container_name = Some(name.clone());
        }
        if let Some(command) = &self.init_command {
            config.init_command = Some(command.clone());
        }
        if self.delete_tmp_files {
            config.delete_tmp_files = true;
        }
        config
    }
}

#[derive(Debug)]
pub struct ShowConfigOptions {
    pub config_override: Option<PathBuf>,
    pub format: ConfigFormat,
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ConfigFormat {
    #[default]
    Toml,
    /// Component model (provider, type, version, config)
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "dockexec")]
#[command(author = "dockexec contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run code files inside a sandboxed Docker/Podman container")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute code files in order, stopping at the first failure
    Run {
        /// Code files to execute
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Language of every file (inferred from the extension otherwise)
        #[arg(short = 'l', long = "lang")]
        language: Option<String>,
        /// Container image
        #[arg(short = 'i', long = "image")]
        image: Option<String>,
        /// Per-file timeout in seconds
        #[arg(short = 't', long = "timeout")]
        timeout: Option<u64>,
        /// Host working directory mounted at /workspace
        #[arg(short = 'w', long = "work-dir")]
        work_dir: Option<PathBuf>,
        /// Fixed container name (reused if it already exists)
        #[arg(long = "container-name")]
        container_name: Option<String>,
        /// Shell command run once after the container starts
        #[arg(long = "init-command")]
        init_command: Option<String>,
        /// Delete code files after they run
        #[arg(long = "delete-tmp-files")]
        delete_tmp_files: bool,
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        /// Enable verbose output
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,
    },
    /// Print the effective configuration
    ShowConfig {
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        /// Output format
        #[arg(short = 'f', long = "format", value_enum, default_value_t = ConfigFormat::Toml)]
        format: ConfigFormat,
        /// Enable verbose output
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,
    },
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Run {
                files,
                language,
                image,
                timeout,
                work_dir,
                container_name,
                init_command,
                delete_tmp_files,
                config,
                verbose,
            }) => Ok(ExecutionMode::Run(RunConfig {
                files: files.clone(),
                language: language.clone(),
                config_override: config.clone(),
                overrides: ExecutorOverrides {
                    image: image.clone(),
                    timeout: *timeout,
                    work_dir: work_dir.clone(),
                    container_name: container_name.clone(),
                    init_command: init_command.clone(),
                    delete_tmp_files: *delete_tmp_files,
                },
                verbose: *verbose,
            })),
            Some(Commands::ShowConfig {
                config,
                format,
                verbose,
            }) => Ok(ExecutionMode::ShowConfig(ShowConfigOptions {
                config_override: config.clone(),
                format: *format,
                verbose: *verbose,
            })),
            None => Err(
                "No command specified. Use 'dockexec --help' to see available commands."
                    .to_string(),
            ),
        }
    }
}

impl RunConfig {
    /// Read every file into a code block, in command-line order.
    pub fn code_blocks(&self) -> Result<Vec<CodeBlock>> {
        self.files
            .iter()
            .map(|path| {
                let language = match &self.language {
                    Some(language) => language.clone(),
                    None => infer_language(path)?.to_string(),
                };
                let code = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Ok(CodeBlock::new(language, code))
            })
            .collect()
    }
}

/// Infer a language tag from a file extension.
///
/// Note: Extension matching is case-insensitive
pub fn infer_language(path: &Path) -> Result<&'static str> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();

    Ok(match extension.as_str() {
        "py" => "python",
        "sh" | "bash" => "sh",
        "ps1" => "pwsh",
        "js" | "mjs" => "javascript",
        _ => bail!(
            "Cannot infer the language of {}; pass --lang",
            path.display()
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn run_command(files: Vec<&str>) -> Commands {
        Commands::Run {
            files: files.into_iter().map(PathBuf::from).collect(),
            language: None,
            image: None,
            timeout: None,
            work_dir: None,
            container_name: None,
            init_command: None,
            delete_tmp_files: false,
            config: None,
            verbose: false,
        }
    }

    #[test]
    fn test_run_command() {
        let args = Args {
            command: Some(run_command(vec!["a.py", "b.sh"])),
        };

        if let ExecutionMode::Run(config) = args.mode().unwrap() {
            assert_eq!(config.files.len(), 2);
            assert!(config.language.is_none());
            assert!(!config.verbose);
        } else {
            panic!("Expected Run mode");
        }
    }

    #[test]
    fn test_parse_run_flags() {
        let args = Args::try_parse_from([
            "dockexec",
            "run",
            "main.py",
            "--timeout",
            "5",
            "--image",
            "python:3.12-slim",
            "--delete-tmp-files",
            "-v",
        ])
        .unwrap();

        let mode = args.mode().unwrap();
        assert!(mode.verbose());
        let ExecutionMode::Run(config) = mode else {
            panic!("Expected Run mode");
        };
        assert_eq!(config.overrides.timeout, Some(5));
        assert_eq!(config.overrides.image.as_deref(), Some("python:3.12-slim"));
        assert!(config.overrides.delete_tmp_files);
    }

    #[test]
    fn test_run_requires_files() {
        assert!(Args::try_parse_from(["dockexec", "run"]).is_err());
    }

    #[test]
    fn test_show_config_format() {
        let args =
            Args::try_parse_from(["dockexec", "show-config", "--format", "json"]).unwrap();
        let ExecutionMode::ShowConfig(options) = args.mode().unwrap() else {
            panic!("Expected ShowConfig mode");
        };
        assert_eq!(options.format, ConfigFormat::Json);
        assert!(options.config_override.is_none());
    }

    #[test]
    fn test_no_command_error() {
        let args = Args { command: None };
        assert!(args.mode().is_err());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let base = ExecutorConfig::new("python:3-slim").with_timeout(60);
        let overrides = ExecutorOverrides {
            image: Some("node:20-slim".to_string()),
            timeout: Some(5),
            container_name: Some("sandbox".to_string()),
            ..Default::default()
        };

        let config = overrides.apply(base);
        assert_eq!(config.image, "node:20-slim");
        assert_eq!(config.timeout, 5);
        assert_eq!(config.container_name.as_deref(), Some("sandbox"));
        assert!(!config.delete_tmp_files);
        assert!(config.work_dir.is_none());
    }

    #[test]
    fn test_language_inference() {
        assert_eq!(infer_language(Path::new("main.py")).unwrap(), "python");
        assert_eq!(infer_language(Path::new("setup.SH")).unwrap(), "sh");
        assert_eq!(infer_language(Path::new("/path/to/app.js")).unwrap(), "javascript");
        assert_eq!(infer_language(Path::new("build.ps1")).unwrap(), "pwsh");
        assert!(infer_language(Path::new("notes.txt")).is_err());
        assert!(infer_language(Path::new("Makefile")).is_err());
    }

    #[test]
    fn test_code_blocks_keep_order_and_honor_lang() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("first.py");
        let second = temp_dir.path().join("second.txt");
        std::fs::write(&first, "print(1)").unwrap();
        std::fs::write(&second, "echo 2").unwrap();

        let mut config = RunConfig {
            files: vec![first.clone(), second.clone()],
            language: None,
            config_override: None,
            overrides: ExecutorOverrides::default(),
            verbose: false,
        };
        assert!(config.code_blocks().is_err());

        config.language = Some("sh".to_string());
        let blocks = config.code_blocks().unwrap();
        assert_eq!(blocks[0], CodeBlock::new("sh", "print(1)"));
        assert_eq!(blocks[1], CodeBlock::new("sh", "echo 2"));

        config.files = vec![first];
        config.language = None;
        assert_eq!(config.code_blocks().unwrap()[0].language, "python");
    }
}
