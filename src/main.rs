use anyhow::{Context, Result};
use dockexec::cli::{Args, ConfigDiscovery, ConfigFormat, ExecutionMode, RunConfig, ShowConfigOptions};
use dockexec::{ComponentModel, DockerCommandLineCodeExecutor};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    init_tracing(mode.verbose());

    match mode {
        ExecutionMode::Run(config) => {
            let exit_code = run(config).await?;
            std::process::exit(process_exit_code(exit_code));
        }
        ExecutionMode::ShowConfig(options) => show_config(options),
    }
}

/// Logs go to stderr so stdout carries only program output.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "dockexec=debug" } else { "dockexec=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(config: RunConfig) -> Result<i32> {
    let executor_config = config
        .overrides
        .apply(ConfigDiscovery::load(config.config_override.as_deref())?);
    let blocks = config.code_blocks()?;
    info!(
        "Running {} file(s) in {} (timeout {}s)",
        blocks.len(),
        executor_config.image,
        executor_config.timeout
    );

    let cancellation = CancellationToken::new();
    let interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling execution");
            interrupt.cancel();
        }
    });

    let mut executor = DockerCommandLineCodeExecutor::new(executor_config)?;
    let result = executor
        .scoped(|executor| {
            Box::pin(async move { executor.execute_code_blocks(&blocks, &cancellation).await })
        })
        .await
        .context("Failed to run the sandbox container")??;

    print!("{}", result.output);
    if !result.output.is_empty() && !result.output.ends_with('\n') {
        println!();
    }

    if let Some(code_file) = &result.code_file {
        info!("Last code file: {}", code_file.display());
    }
    if result.output_truncated {
        warn!("Output was truncated");
    }
    info!("Exit code: {}", result.exit_code);

    Ok(result.exit_code)
}

fn show_config(options: ShowConfigOptions) -> Result<()> {
    let config = ConfigDiscovery::load(options.config_override.as_deref())?;
    let rendered = match options.format {
        ConfigFormat::Toml => config.to_toml_string()?,
        ConfigFormat::Json => ComponentModel::docker_executor(config).to_json()?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

fn process_exit_code(exit_code: i32) -> i32 {
    if (0..=255).contains(&exit_code) {
        exit_code
    } else {
        1
    }
}
