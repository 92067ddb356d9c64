//! Thin async handle over the `docker` binary.
//!
//! Every call shells out through `tokio::process::Command`; there is no
//! daemon connection to hold, so the handle is freely cloneable.

use std::collections::HashMap;
use std::process::Output;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, SandboxError};

#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    /// Point at a non-default binary (podman, a wrapper script, a test stub).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(binary = %self.binary, ?args, "docker invocation");
        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SandboxError::Unavailable(format!("{} not runnable: {}", self.binary, e)))?;
        Ok(output)
    }

    /// Whether a container with this name or id exists (any state).
    pub async fn container_exists(&self, name: &str) -> Result<bool> {
        let output = self.run(&["inspect", "--format", "{{.Id}}", name]).await?;
        Ok(output.status.success())
    }

    /// Create and start a long-lived executor container.
    pub async fn create_container(&self, name: &str, image: &str) -> Result<()> {
        let create = self
            .run(&[
                "create",
                "--name",
                name,
                "--hostname",
                name,
                "--network",
                "host",
                "--restart",
                "unless-stopped",
                "-e",
                "PYTHONUNBUFFERED=1",
                image,
            ])
            .await?;
        if !create.status.success() {
            return Err(SandboxError::Unavailable(format!(
                "container create failed: {}",
                String::from_utf8_lossy(&create.stderr).trim()
            )));
        }

        let start = self.run(&["start", name]).await?;
        if !start.status.success() {
            return Err(SandboxError::Unavailable(format!(
                "container start failed: {}",
                String::from_utf8_lossy(&start.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Copy a host file into the container (the CLI streams it as a tar
    /// archive under the hood).
    pub async fn copy_in(&self, name: &str, host_path: &str, container_path: &str) -> Result<()> {
        let dest = format!("{}:{}", name, container_path);
        let output = self.run(&["cp", host_path, &dest]).await?;
        if !output.status.success() {
            return Err(SandboxError::Io(format!(
                "copy into container failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Run a shell command inside the container with the given env,
    /// returning the raw process output.
    pub async fn exec_shell(
        &self,
        name: &str,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<Output> {
        let mut args: Vec<String> = vec!["exec".to_string()];
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(name.to_string());
        args.push("/bin/sh".to_string());
        args.push("-c".to_string());
        args.push(command.to_string());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&arg_refs).await
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}
