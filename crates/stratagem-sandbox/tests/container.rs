//! Tests that need a live Docker daemon and a python-capable executor
//! image. Run with `cargo test -p stratagem-sandbox -- --ignored`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use stratagem_core::config::SandboxConfig;
use stratagem_sandbox::{DockerCli, Sandbox, SandboxError, SandboxExecutor};

fn test_config() -> SandboxConfig {
    SandboxConfig {
        container_name: "stratagem-test-executor".to_string(),
        image: std::env::var("STRATAGEM_TEST_IMAGE").unwrap_or_else(|_| "python:3.12-slim".to_string()),
        cache_dir: std::env::temp_dir()
            .join("stratagem-sandbox-test")
            .to_string_lossy()
            .to_string(),
        run_timeout_secs: 5,
    }
}

#[tokio::test]
#[ignore]
async fn runs_a_script_and_captures_output() {
    let executor = SandboxExecutor::connect(DockerCli::new(), &test_config(), HashMap::new())
        .await
        .unwrap();

    let artifact = executor.run_code("print(1)", "itest").await.unwrap();
    assert_eq!(artifact.stdout_merged, "1\n");
    assert_eq!(artifact.exit_code, 0);
    assert!(artifact.reflected_body.contains("print(1)"));
}

#[tokio::test]
#[ignore]
async fn timeout_leaves_container_responsive() {
    let config = test_config();
    let executor = SandboxExecutor::connect(DockerCli::new(), &config, HashMap::new())
        .await
        .unwrap();

    let started = Instant::now();
    let result = executor.run_code("while True: pass", "itest").await;
    assert!(matches!(result, Err(SandboxError::Timeout { .. })));
    // deadline plus a small constant for the docker round-trips
    assert!(started.elapsed() < Duration::from_secs(config.run_timeout_secs + 5));

    let artifact = executor.run_code("print(1)", "itest").await.unwrap();
    assert_eq!(artifact.stdout_merged, "1\n");
}

#[tokio::test]
#[ignore]
async fn nonzero_exit_reports_exec_failure_with_output() {
    let executor = SandboxExecutor::connect(DockerCli::new(), &test_config(), HashMap::new())
        .await
        .unwrap();

    let err = executor
        .run_code("import not_a_real_module", "itest")
        .await
        .unwrap_err();
    match err {
        SandboxError::Exec { output } => assert!(output.contains("ModuleNotFoundError")),
        other => panic!("expected exec failure, got {other:?}"),
    }
}
