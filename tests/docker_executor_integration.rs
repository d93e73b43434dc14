//! Integration tests for the Docker command-line executor.
//!
//! These tests run code in a real python:3-slim container.
//! Tests are skipped if Docker/Podman is not available, or if SKIP_DOCKER=1
//! or SKIP_CONTAINER_TESTS=1.

use dockexec::container::ContainerOrchestrator;
use dockexec::{
    CodeBlock, ContainerRuntime, DockerCommandLineCodeExecutor, ExecutorConfig, ExecutorError,
    VolumeBinding,
};
use serial_test::serial;
use std::time::Duration;
use tempfile::TempDir;
use test_tag::tag;
use tokio_util::sync::CancellationToken;

/// Check if container tests should run.
fn should_run_container_tests() -> bool {
    for var in ["SKIP_DOCKER", "SKIP_CONTAINER_TESTS"] {
        if let Ok(value) = std::env::var(var) {
            if value == "1" || value.eq_ignore_ascii_case("true") {
                return false;
            }
        }
    }

    // Check if Docker or Podman is available
    std::process::Command::new("docker")
        .arg("info")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
        || std::process::Command::new("podman")
            .arg("info")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
}

macro_rules! require_docker {
    () => {
        if !should_run_container_tests() {
            eprintln!("Skipping container tests (Docker/Podman not available or SKIP_DOCKER=1)");
            return;
        }
    };
}

fn python(code: &str) -> CodeBlock {
    CodeBlock::new("python", code)
}

async fn run_batch(
    executor: &mut DockerCommandLineCodeExecutor,
    blocks: &[CodeBlock],
) -> dockexec::CodeResult {
    executor
        .execute_code_blocks(blocks, &CancellationToken::new())
        .await
        .expect("batch should run")
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_hello_world_batch() {
    require_docker!();

    let temp_dir = TempDir::new().unwrap();
    let mut executor = DockerCommandLineCodeExecutor::new(
        ExecutorConfig::default().with_work_dir(temp_dir.path()),
    )
    .unwrap();

    let result = executor
        .scoped(|executor| {
            Box::pin(async move {
                run_batch(
                    executor,
                    &[
                        python("print('hello world!')"),
                        python("a = 100 + 100; print(a)"),
                    ],
                )
                .await
            })
        })
        .await
        .unwrap();

    assert_eq!(result.exit_code, 0);
    assert!(result.output.contains("hello world!"));
    assert!(result.output.contains("200"));
    let code_file = result.code_file.unwrap();
    assert!(code_file.exists());
    assert!(code_file.starts_with(temp_dir.path()));
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_failures_and_languages() {
    require_docker!();

    let temp_dir = TempDir::new().unwrap();
    let mut executor = DockerCommandLineCodeExecutor::new(
        ExecutorConfig::default().with_work_dir(temp_dir.path()),
    )
    .unwrap();
    executor.start().await.unwrap();

    let result = run_batch(&mut executor, &[CodeBlock::new("sh", "echo hello from sh")]).await;
    assert_eq!(result.exit_code, 0);
    assert!(result.output.contains("hello from sh"));

    let result = run_batch(
        &mut executor,
        &[
            python("import sys; print('boom', file=sys.stderr); sys.exit(3)"),
            python("open('after.txt', 'w').write('x')"),
        ],
    )
    .await;
    assert_eq!(result.exit_code, 3);
    assert!(result.output.contains("boom"));
    assert!(!temp_dir.path().join("after.txt").exists());

    let result = run_batch(&mut executor, &[python("raise ValueError('bad')")]).await;
    assert_ne!(result.exit_code, 0);
    assert!(result.output.contains("ValueError"));

    executor.stop().await.unwrap();
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_timeout() {
    require_docker!();

    let temp_dir = TempDir::new().unwrap();
    let mut executor = DockerCommandLineCodeExecutor::new(
        ExecutorConfig::default()
            .with_work_dir(temp_dir.path())
            .with_timeout(1),
    )
    .unwrap();
    executor.start().await.unwrap();

    let result = run_batch(
        &mut executor,
        &[python("import time; time.sleep(10); print('hello world!')")],
    )
    .await;

    assert_eq!(result.exit_code, 124);
    assert!(result.output.contains("Timeout"));
    assert!(!result.output.contains("hello world!"));

    executor.stop().await.unwrap();
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_cancellation() {
    require_docker!();

    let temp_dir = TempDir::new().unwrap();
    let mut executor = DockerCommandLineCodeExecutor::new(
        ExecutorConfig::default().with_work_dir(temp_dir.path()),
    )
    .unwrap();
    executor.start().await.unwrap();

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        canceller.cancel();
    });

    let code = "import time\ntime.sleep(10)\nopen('hello.txt', 'w').write('hello world')";
    let result = executor
        .execute_code_blocks(&[python(code)], &token)
        .await
        .unwrap();

    assert_ne!(result.exit_code, 0);
    assert!(result.output.contains("Code execution was cancelled"));

    // The killed process must not get a chance to finish
    tokio::time::sleep(Duration::from_secs(8)).await;
    assert!(!temp_dir.path().join("hello.txt").exists());

    executor.stop().await.unwrap();
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_filename_directives() {
    require_docker!();

    let temp_dir = TempDir::new().unwrap();
    let mut executor = DockerCommandLineCodeExecutor::new(
        ExecutorConfig::default().with_work_dir(temp_dir.path()),
    )
    .unwrap();
    executor.start().await.unwrap();

    let result = run_batch(
        &mut executor,
        &[python("# filename: test.py\n\nprint('hello world')")],
    )
    .await;
    assert_eq!(result.exit_code, 0);
    assert!(result.output.contains("hello world"));
    assert_eq!(
        result.code_file.unwrap().canonicalize().unwrap(),
        temp_dir.path().join("test.py").canonicalize().unwrap()
    );

    let result = run_batch(
        &mut executor,
        &[python("# filename: /tmp/test.py\n\nprint('hello world')")],
    )
    .await;
    assert_eq!(result.exit_code, 1);
    assert!(result.output.contains("Filename is not in the workspace"));
    assert!(result.code_file.is_none());

    executor.stop().await.unwrap();
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_delete_tmp_files() {
    require_docker!();

    let temp_dir = TempDir::new().unwrap();
    let mut executor = DockerCommandLineCodeExecutor::new(
        ExecutorConfig::default()
            .with_work_dir(temp_dir.path())
            .with_delete_tmp_files(true),
    )
    .unwrap();
    executor.start().await.unwrap();

    let result = run_batch(
        &mut executor,
        &[
            python("print('first block')"),
            python("open('output.txt', 'w').write('kept')"),
        ],
    )
    .await;
    assert_eq!(result.exit_code, 0);
    assert!(!result.code_file.unwrap().exists());
    assert!(temp_dir.path().join("output.txt").exists());

    let result = run_batch(&mut executor, &[python("raise Exception('fail')")]).await;
    assert_ne!(result.exit_code, 0);
    assert!(!result.code_file.unwrap().exists());

    executor.stop().await.unwrap();
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_container_settings() {
    require_docker!();

    let temp_dir = TempDir::new().unwrap();
    let data_dir = TempDir::new().unwrap();
    std::fs::write(data_dir.path().join("input.txt"), "mounted data").unwrap();

    let mut executor = DockerCommandLineCodeExecutor::new(
        ExecutorConfig::default()
            .with_work_dir(temp_dir.path())
            .with_extra_volume(
                data_dir.path().display().to_string(),
                VolumeBinding::new("/mnt/data", "ro"),
            )
            .with_extra_host("example.test", "127.0.0.1")
            .with_init_command("echo ready > /workspace/init.txt"),
    )
    .unwrap();
    executor.start().await.unwrap();

    assert!(temp_dir.path().join("init.txt").exists());

    let result = run_batch(
        &mut executor,
        &[
            python("print(open('/mnt/data/input.txt').read())"),
            CodeBlock::new("sh", "grep example.test /etc/hosts"),
        ],
    )
    .await;
    assert_eq!(result.exit_code, 0, "{}", result.output);
    assert!(result.output.contains("mounted data"));
    assert!(result.output.contains("127.0.0.1"));

    let result = run_batch(
        &mut executor,
        &[python("open('/mnt/data/new.txt', 'w').write('x')")],
    )
    .await;
    assert_ne!(result.exit_code, 0);

    executor.stop().await.unwrap();
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_lifecycle() {
    require_docker!();

    let mut executor = DockerCommandLineCodeExecutor::new(ExecutorConfig::default()).unwrap();
    assert!(matches!(
        executor.work_dir(),
        Err(ExecutorError::WorkDirNotInitialized)
    ));

    executor.start().await.unwrap();
    let work_dir = executor.work_dir().unwrap().to_path_buf();
    assert!(work_dir.is_dir());

    let result = run_batch(&mut executor, &[python("print('before restart')")]).await;
    assert_eq!(result.exit_code, 0);

    executor.restart().await.unwrap();
    let result = run_batch(&mut executor, &[python("print('after restart')")]).await;
    assert!(result.output.contains("after restart"));

    let name = executor.container_name().to_string();
    executor.stop().await.unwrap();
    executor.stop().await.unwrap();
    assert!(!work_dir.exists());

    let orchestrator = ContainerOrchestrator::new().await.unwrap();
    assert_eq!(orchestrator.find_container(&name).await.unwrap(), None);

    let err = executor
        .execute_code_blocks(&[python("print(1)")], &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::NotStarted));
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_component_round_trip_executes() {
    require_docker!();

    let temp_dir = TempDir::new().unwrap();
    let executor = DockerCommandLineCodeExecutor::new(
        ExecutorConfig::default()
            .with_work_dir(temp_dir.path())
            .with_timeout(30),
    )
    .unwrap();

    let model = executor.dump_component();
    let mut loaded = DockerCommandLineCodeExecutor::load_component(&model).unwrap();
    assert_eq!(loaded.config(), executor.config());

    let result = loaded
        .scoped(|executor| {
            Box::pin(async move { run_batch(executor, &[python("print('loaded')")]).await })
        })
        .await
        .unwrap();
    assert!(result.output.contains("loaded"));
}
