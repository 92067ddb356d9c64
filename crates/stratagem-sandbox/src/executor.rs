use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use stratagem_core::config::SandboxConfig;

use crate::docker::DockerCli;
use crate::error::{Result, SandboxError};

/// Everything one script run produced. Lives for a single cycle; only the
/// host cache file outlasts it.
#[derive(Debug, Clone)]
pub struct ExecutionArtifact {
    pub script_body: String,
    pub postfix_tag: String,
    pub host_cache_path: String,
    pub in_container_path: String,
    pub reflected_body: String,
    pub stdout_merged: String,
    pub exit_code: i32,
}

/// The seam the orchestrator runs code through; implemented by the real
/// container executor and by the scripted mock in tests.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn run_code(&self, script: &str, postfix: &str) -> Result<ExecutionArtifact>;
}

/// Long-lived container executor. One instance per driver process; the
/// container is reused across cycles to amortize startup.
pub struct SandboxExecutor {
    docker: DockerCli,
    container: String,
    host_cache: PathBuf,
    env: HashMap<String, String>,
    run_timeout: Duration,
}

impl SandboxExecutor {
    /// Resolve or create the executor container. Creation failure is fatal:
    /// without a sandbox no cycle can run.
    pub async fn connect(
        docker: DockerCli,
        config: &SandboxConfig,
        env: HashMap<String, String>,
    ) -> Result<Self> {
        if !docker.container_exists(&config.container_name).await? {
            info!(
                container = %config.container_name,
                image = %config.image,
                "executor container not found, creating it"
            );
            docker
                .create_container(&config.container_name, &config.image)
                .await?;
        }

        Ok(Self {
            docker,
            container: config.container_name.clone(),
            host_cache: PathBuf::from(&config.cache_dir),
            env,
            run_timeout: Duration::from_secs(config.run_timeout_secs),
        })
    }

    /// Materialize `script` on the host, inject it into the container, and
    /// verify it landed. Returns the in-container path and the read-back
    /// body.
    pub async fn write_code(
        &self,
        script: &str,
        postfix: &str,
        container_path: &str,
    ) -> Result<(String, String)> {
        let file_name = temp_script_name();
        let in_container = format!("{}/{}", container_path.trim_end_matches('/'), file_name);

        let host_dir = self.host_cache.join(format!("temp_codes_{}", postfix));
        tokio::fs::create_dir_all(&host_dir).await?;
        let host_path = host_dir.join(&file_name);
        tokio::fs::write(&host_path, script).await?;

        self.docker
            .copy_in(
                &self.container,
                &host_path.to_string_lossy(),
                &format!("{}/", container_path.trim_end_matches('/')),
            )
            .await?;

        let check = self
            .docker
            .exec_shell(
                &self.container,
                &format!("test -f {} && echo exists || echo missing", in_container),
                &HashMap::new(),
            )
            .await?;
        if !String::from_utf8_lossy(&check.stdout).contains("exists") {
            return Err(SandboxError::Io(format!(
                "script verification failed for {}",
                in_container
            )));
        }

        let reflected = self
            .docker
            .exec_shell(
                &self.container,
                &format!("cat {}", in_container),
                &HashMap::new(),
            )
            .await?;

        Ok((
            in_container,
            String::from_utf8_lossy(&reflected.stdout).to_string(),
        ))
    }

    /// Best-effort cleanup of any python process the script left behind,
    /// so one runaway run can't poison the next.
    async fn kill_stray_python(&self) {
        let result = self
            .docker
            .exec_shell(
                &self.container,
                "kill -9 $(pidof python) 2>/dev/null",
                &HashMap::new(),
            )
            .await;
        if let Err(e) = result {
            warn!(error = %e, "stray-python cleanup failed");
        }
    }
}

#[async_trait]
impl Sandbox for SandboxExecutor {
    async fn run_code(&self, script: &str, postfix: &str) -> Result<ExecutionArtifact> {
        let (in_container, reflected) = self.write_code(script, postfix, "/").await?;
        let host_path = self
            .host_cache
            .join(format!("temp_codes_{}", postfix))
            .join(in_container.trim_start_matches('/'));

        let command = format!("python -u {} 2>&1", in_container);
        let exec = tokio::time::timeout(
            self.run_timeout,
            self.docker.exec_shell(&self.container, &command, &self.env),
        )
        .await;

        self.kill_stray_python().await;

        let output = match exec {
            Ok(result) => result?,
            Err(_elapsed) => {
                return Err(SandboxError::Timeout {
                    secs: self.run_timeout.as_secs(),
                });
            }
        };

        let stdout_merged = String::from_utf8_lossy(&output.stdout).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        if exit_code != 0 {
            return Err(SandboxError::Exec {
                output: stdout_merged,
            });
        }

        Ok(ExecutionArtifact {
            script_body: script.to_string(),
            postfix_tag: postfix.to_string(),
            host_cache_path: host_path.to_string_lossy().to_string(),
            in_container_path: in_container,
            reflected_body: reflected,
            stdout_merged,
            exit_code,
        })
    }
}

/// Timestamped script name, unique enough for one cycle's cadence.
fn temp_script_name() -> String {
    format!(
        "temp_script_{}.py",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_names_are_timestamped_python_files() {
        let name = temp_script_name();
        assert!(name.starts_with("temp_script_"));
        assert!(name.ends_with(".py"));
        // temp_script_YYYYmmdd_HHMMSS.py
        assert_eq!(name.len(), "temp_script_20250101_120000.py".len());
    }
}
