//! MySQL connectivity smoke test
//!
//! Provisions a single server and verifies a real client round trip through
//! the published port. Run with `cargo test -- --ignored`.

use anyhow::Result;
use bulkload_e2e::{Docker, MySQLContainer};
use mysql_async::prelude::*;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[tokio::test]
#[ignore = "requires a local docker daemon"]
async fn mysql_container_accepts_connections() -> Result<()> {
    init_logging();

    let docker = Docker::new();
    let mut container = MySQLContainer::new(&docker, "bulkload-e2e-ping", 13309);
    container.start()?;
    container.wait_until_ready(Duration::from_secs(120)).await?;

    let pool = container.get_pool()?;
    let mut conn = pool.get_conn().await?;
    let one: Option<i32> = conn.query_first("SELECT 1").await?;
    assert_eq!(one, Some(1));
    drop(conn);
    pool.disconnect().await?;

    container.stop()?;
    Ok(())
}
