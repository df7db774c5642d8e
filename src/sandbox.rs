//! Sandbox image and migration job container

use crate::docker::{host_mount_path, Docker};
use crate::mysql::MySQLEndpoint;
use crate::network::TestNetwork;
use crate::watch::{JobState, JobStateSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// In-container path the job configuration template is mounted at, and the
/// sole argument the sandbox entrypoint is invoked with.
pub const JOB_CONFIG_PATH: &str = "/app/config.yml.liquid";

/// Reference to the sandbox image holding the bulk-load tool.
#[derive(Clone)]
pub struct SandboxImage {
    docker: Docker,
    tag: String,
}

impl SandboxImage {
    /// Builds the sandbox image from a docker build context.
    pub fn build(docker: &Docker, tag: &str, context_dir: &Path) -> Result<Self> {
        docker.build_image(tag, context_dir)?;
        Ok(Self {
            docker: docker.clone(),
            tag: tag.to_string(),
        })
    }

    /// References an already-built image.
    pub fn reference(docker: &Docker, tag: &str) -> Self {
        Self {
            docker: docker.clone(),
            tag: tag.to_string(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// One bulk-load run: a container started from the sandbox image with the
/// source and destination endpoints injected as environment variables.
pub struct MigrationJob {
    docker: Docker,
    container_name: String,
    image_tag: String,
    src: MySQLEndpoint,
    dst: MySQLEndpoint,
    job_config: PathBuf,
    network_name: String,
    stopped: bool,
}

impl MigrationJob {
    pub fn new(
        image: &SandboxImage,
        container_name: &str,
        network: &TestNetwork,
        src: MySQLEndpoint,
        dst: MySQLEndpoint,
        job_config: impl Into<PathBuf>,
    ) -> Self {
        Self {
            docker: image.docker.clone(),
            container_name: container_name.to_string(),
            image_tag: image.tag.clone(),
            src,
            dst,
            job_config: job_config.into(),
            network_name: network.name().to_string(),
            stopped: false,
        }
    }

    /// Environment the job container is started with. The tool's config
    /// templating reads exactly these four variables.
    fn env(&self) -> [(&'static str, String); 4] {
        [
            ("SRC_HOST", self.src.host.clone()),
            ("SRC_PORT", self.src.port.to_string()),
            ("DST_HOST", self.dst.host.clone()),
            ("DST_PORT", self.dst.port.to_string()),
        ]
    }

    /// Starts the job container detached.
    pub fn start(&self) -> Result<()> {
        info!("Starting migration job: {}", self.container_name);

        self.docker.run_quiet(["stop", self.container_name.as_str()]);
        self.docker.run_quiet(["rm", self.container_name.as_str()]);

        let mut args: Vec<String> = vec![
            "run".into(),
            "--name".into(),
            self.container_name.clone(),
        ];
        for (key, value) in self.env() {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        args.push("-v".into());
        args.push(format!(
            "{}:{JOB_CONFIG_PATH}:ro",
            host_mount_path(&self.job_config)?
        ));
        args.push("--network".into());
        args.push(self.network_name.clone());
        args.push("-d".into());
        args.push(self.image_tag.clone());
        // The entrypoint takes the in-container config path as its only argument
        args.push(JOB_CONFIG_PATH.into());

        let container_id = self
            .docker
            .run(&args)
            .context("Failed to start migration container")?;
        info!("Started container: {container_id}");

        Ok(())
    }

    /// Gets logs from the container
    pub fn get_logs(&self) -> Result<String> {
        self.docker.logs(&self.container_name)
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Stops and removes the container. Runs at most once; `Drop` covers
    /// any path that skips it.
    pub fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.docker.terminate_container(&self.container_name)
    }
}

#[async_trait]
impl JobStateSource for MigrationJob {
    async fn state(&self) -> Result<JobState> {
        let state = self.docker.inspect_state(&self.container_name)?;
        if state.is_running() {
            Ok(JobState::Running)
        } else {
            Ok(JobState::Exited(state.exit_code))
        }
    }

    async fn diagnostics(&self) -> Result<String> {
        self.docker.logs(&self.container_name)
    }
}

impl Drop for MigrationJob {
    fn drop(&mut self) {
        // Best effort cleanup
        if !self.stopped {
            self.stopped = true;
            let _ = self.docker.terminate_container(&self.container_name);
        }
    }
}
