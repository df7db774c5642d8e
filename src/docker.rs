//! Thin wrapper around the docker CLI

use anyhow::{Context, Result};
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Handle to the docker command-line program.
///
/// The program path is injectable so tests can point the harness at a
/// recording stub instead of a real daemon.
#[derive(Clone, Debug)]
pub struct Docker {
    program: PathBuf,
}

impl Default for Docker {
    fn default() -> Self {
        Self {
            program: PathBuf::from("docker"),
        }
    }
}

impl Docker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an alternative docker binary (or a test stub).
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Runs a docker subcommand and returns its trimmed stdout.
    pub fn run<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to execute {}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("docker command failed: {stderr}");
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Best-effort invocation for cleanup paths; failures are logged at
    /// debug and swallowed.
    pub fn run_quiet<I, S>(&self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let status = Command::new(&self.program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = status {
            debug!("docker invocation failed: {e}");
        }
    }

    /// Builds an image from `context_dir`, streaming build output to the
    /// console.
    pub fn build_image(&self, tag: &str, context_dir: &Path) -> Result<()> {
        info!("Building Docker image: {tag}");

        let status = Command::new(&self.program)
            .args(["build", "-t", tag])
            .arg(context_dir)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .context("Failed to execute docker build command")?;

        if !status.success() {
            anyhow::bail!("Docker build failed for image {tag}");
        }

        info!("Successfully built Docker image");
        Ok(())
    }

    /// Queries the current state of a container.
    pub fn inspect_state(&self, container_name: &str) -> Result<ContainerState> {
        let json = self
            .run(["inspect", "--format", "{{json .State}}", container_name])
            .with_context(|| format!("Failed to inspect container {container_name}"))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Unexpected inspect output for {container_name}"))
    }

    /// Gets logs from a container.
    pub fn logs(&self, container_name: &str) -> Result<String> {
        let output = Command::new(&self.program)
            .args(["logs", container_name])
            .output()
            .context("Failed to get container logs")?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        Ok(format!("STDOUT:\n{stdout}\n\nSTDERR:\n{stderr}"))
    }

    /// Stops and removes a container, tolerating its absence.
    pub fn terminate_container(&self, container_name: &str) -> Result<()> {
        info!("Stopping container: {container_name}");

        let output = Command::new(&self.program)
            .args(["stop", container_name])
            .output()
            .context("Failed to stop container")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("Failed to stop container (may not exist): {stderr}");
        }

        let output = Command::new(&self.program)
            .args(["rm", container_name])
            .output()
            .context("Failed to remove container")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("Failed to remove container (may not exist): {stderr}");
        }

        info!("Container stopped and removed");
        Ok(())
    }
}

/// Resolves a host path for a bind mount. Docker rejects relative sources.
pub(crate) fn host_mount_path(path: &Path) -> Result<String> {
    let abs = std::fs::canonicalize(path)
        .with_context(|| format!("Failed to resolve mount source {}", path.display()))?;
    Ok(abs.display().to_string())
}

/// Container state as reported by `docker inspect`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    pub status: String,
    pub exit_code: i64,
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}
