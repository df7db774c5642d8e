//! Docker container management for MySQL testing

use crate::docker::{host_mount_path, Docker};
use crate::network::TestNetwork;
use anyhow::{Context, Result};
use mysql_async::prelude::*;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Database created by the image entrypoint on first boot.
pub const MYSQL_DATABASE: &str = "app";
pub const MYSQL_USER: &str = "user";
pub const MYSQL_PASSWORD: &str = "password";

const MYSQL_PORT: u16 = 3306;
const SERVER_CONFIG_PATH: &str = "/etc/mysql/conf.d/mysql.cnf";
const INIT_SQL_PATH: &str = "/docker-entrypoint-initdb.d/init.sql";

/// Line the server prints once it listens on 3306. Only the log-scrape
/// fallback probe depends on it; the exact text tracks the mysql:8.4 image.
pub const READY_LOG_LINE: &str = "port: 3306  MySQL Community Server - GPL";

/// Where a MySQL server can be reached, with the credentials tests use.
#[derive(Debug, Clone)]
pub struct MySQLEndpoint {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl MySQLEndpoint {
    /// Connection URL for `mysql_async`.
    pub fn url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// Configuration for a test MySQL container
pub struct MySQLContainer {
    docker: Docker,
    container_name: String,
    image_name: String,
    host_port: u16,
    network: Option<(String, String)>,
    server_config: Option<PathBuf>,
    init_sql: Option<PathBuf>,
    stopped: bool,
}

impl MySQLContainer {
    /// Creates a new MySQL container configuration.
    ///
    /// `host_port` is published so the readiness probe and assertions can
    /// reach the server from the host; pick a distinct port per container.
    pub fn new(docker: &Docker, container_name: &str, host_port: u16) -> Self {
        Self {
            docker: docker.clone(),
            container_name: container_name.to_string(),
            image_name: "mysql:8.4".to_string(),
            host_port,
            network: None,
            server_config: None,
            init_sql: None,
            stopped: false,
        }
    }

    /// Joins `network` under `alias`, so peers on the same network reach
    /// this server as `alias:3306`.
    pub fn with_network_alias(mut self, network: &TestNetwork, alias: &str) -> Self {
        self.network = Some((network.name().to_string(), alias.to_string()));
        self
    }

    /// Mounts a server configuration file at /etc/mysql/conf.d/mysql.cnf.
    pub fn with_server_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.server_config = Some(path.into());
        self
    }

    /// Mounts an SQL script the image entrypoint executes on first boot.
    pub fn with_init_sql(mut self, path: impl Into<PathBuf>) -> Self {
        self.init_sql = Some(path.into());
        self
    }

    /// Starts the MySQL container
    pub fn start(&self) -> Result<()> {
        info!("Starting MySQL container: {}", self.container_name);

        // Remove any leftover container with the same name from a previous run
        self.docker.run_quiet(["stop", self.container_name.as_str()]);
        self.docker.run_quiet(["rm", self.container_name.as_str()]);

        let mut args: Vec<String> = vec![
            "run".into(),
            "--name".into(),
            self.container_name.clone(),
            "-e".into(),
            format!("MYSQL_DATABASE={MYSQL_DATABASE}"),
            "-e".into(),
            format!("MYSQL_USER={MYSQL_USER}"),
            "-e".into(),
            format!("MYSQL_PASSWORD={MYSQL_PASSWORD}"),
            // root credential bypass for test convenience
            "-e".into(),
            "MYSQL_ALLOW_EMPTY_PASSWORD=yes".into(),
            "-p".into(),
            format!("{}:{MYSQL_PORT}", self.host_port),
        ];
        if let Some((network, alias)) = &self.network {
            args.push("--network".into());
            args.push(network.clone());
            args.push("--network-alias".into());
            args.push(alias.clone());
        }
        if let Some(config) = &self.server_config {
            args.push("-v".into());
            args.push(format!("{}:{SERVER_CONFIG_PATH}:ro", host_mount_path(config)?));
        }
        if let Some(init) = &self.init_sql {
            args.push("-v".into());
            args.push(format!("{}:{INIT_SQL_PATH}:ro", host_mount_path(init)?));
        }
        args.push("-d".into());
        args.push(self.image_name.clone());

        let container_id = self
            .docker
            .run(&args)
            .context("Failed to start Docker container")?;
        info!("Started container: {container_id}");

        Ok(())
    }

    /// Waits for MySQL to be ready to accept connections.
    ///
    /// Active protocol probe: retries a real client connection with backoff
    /// until `SELECT 1` succeeds. Prefer this over [`wait_for_log_line`];
    /// the log text is owned by the image, not by us.
    ///
    /// [`wait_for_log_line`]: MySQLContainer::wait_for_log_line
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        info!("Waiting for MySQL in {} to be ready...", self.container_name);

        let start = Instant::now();
        let mut delay = Duration::from_millis(250);

        while start.elapsed() < timeout {
            match self.test_connection().await {
                Ok(()) => {
                    info!("MySQL in {} is ready", self.container_name);
                    return Ok(());
                }
                Err(e) => {
                    debug!("Connection attempt failed: {e}");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(2));
                }
            }
        }

        anyhow::bail!(
            "MySQL in {} did not become ready within {timeout:?}",
            self.container_name
        )
    }

    /// Tests if we can connect to MySQL
    async fn test_connection(&self) -> Result<()> {
        let pool = mysql_async::Pool::from_url(self.host_endpoint().url())
            .context("Failed to create connection pool")?;

        let mut conn = pool.get_conn().await.context("Failed to get connection")?;

        let _: Option<i32> = conn
            .query_first("SELECT 1")
            .await
            .context("Failed to execute test query")?;

        drop(conn);
        pool.disconnect()
            .await
            .context("Failed to disconnect pool")?;

        Ok(())
    }

    /// Fallback readiness probe that scrapes the container log for a marker
    /// line such as [`READY_LOG_LINE`]. Brittle (couples to the image's
    /// exact log text); use only where a client connection is not an option.
    pub async fn wait_for_log_line(&self, needle: &str, timeout: Duration) -> Result<()> {
        let start = Instant::now();

        while start.elapsed() < timeout {
            if self.get_logs()?.contains(needle) {
                info!("MySQL in {} logged readiness marker", self.container_name);
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        anyhow::bail!(
            "Log line {needle:?} did not appear in {} within {timeout:?}",
            self.container_name
        )
    }

    /// Endpoint as seen from the host, via the published port.
    pub fn host_endpoint(&self) -> MySQLEndpoint {
        MySQLEndpoint {
            host: "127.0.0.1".to_string(),
            port: self.host_port,
            database: MYSQL_DATABASE.to_string(),
            user: MYSQL_USER.to_string(),
            password: MYSQL_PASSWORD.to_string(),
        }
    }

    /// Endpoint as seen by peers on the shared network, via the alias.
    ///
    /// Fails if the container was never given a network alias.
    pub fn network_endpoint(&self) -> Result<MySQLEndpoint> {
        let (_, alias) = self
            .network
            .as_ref()
            .with_context(|| format!("{} has no network alias", self.container_name))?;
        Ok(MySQLEndpoint {
            host: alias.clone(),
            port: MYSQL_PORT,
            database: MYSQL_DATABASE.to_string(),
            user: MYSQL_USER.to_string(),
            password: MYSQL_PASSWORD.to_string(),
        })
    }

    /// Gets a connection pool for the container
    pub fn get_pool(&self) -> Result<mysql_async::Pool> {
        mysql_async::Pool::from_url(self.host_endpoint().url())
            .context("Failed to create connection pool")
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

impl Drop for MySQLContainer {
    fn drop(&mut self) {
        // Best effort cleanup
        if !self.stopped {
            self.stopped = true;
            let _ = self.docker.terminate_container(&self.container_name);
        }
    }
}
