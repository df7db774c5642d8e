//! Shared docker network for test containers

use crate::docker::Docker;
use anyhow::{Context, Result};
use tracing::{debug, info};
use uuid::Uuid;

/// A private docker network shared by the containers of one test scenario.
///
/// The network is an explicit dependency: it is created once per scenario
/// and passed to every provisioning call, and removed with
/// [`TestNetwork::remove`] once the scenario's containers are gone. `Drop`
/// removes it best-effort if the test bails out early.
pub struct TestNetwork {
    docker: Docker,
    name: String,
    removed: bool,
}

impl TestNetwork {
    /// Creates a network with a generated unique name.
    pub fn create(docker: &Docker) -> Result<Self> {
        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!("bulkload-e2e-{}", &suffix[..12]);

        docker
            .run(["network", "create", name.as_str()])
            .with_context(|| format!("Failed to create network {name}"))?;
        info!("Created network: {name}");

        Ok(Self {
            docker: docker.clone(),
            name,
            removed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Removes the network. Safe to call once all member containers are
    /// gone; calling it again is a no-op.
    pub fn remove(&mut self) -> Result<()> {
        if self.removed {
            return Ok(());
        }
        self.docker
            .run(["network", "rm", self.name.as_str()])
            .with_context(|| format!("Failed to remove network {}", self.name))?;
        self.removed = true;
        info!("Removed network: {}", self.name);
        Ok(())
    }
}

impl Drop for TestNetwork {
    fn drop(&mut self) {
        // Best effort cleanup
        if !self.removed {
            debug!("network {} dropped without explicit removal", self.name);
            self.docker.run_quiet(["network", "rm", self.name.as_str()]);
        }
    }
}
