//! Bulk load E2E harness
//!
//! Test fixtures for exercising a containerized MySQL-to-MySQL bulk-load
//! tool end to end: ephemeral MySQL servers, the private docker network they
//! share, the sandbox container running the tool, and a watcher that polls
//! the job container until it reaches a terminal state.
//!
//! # Typical scenario
//!
//! 1. Create a [`TestNetwork`] and start two [`MySQLContainer`]s on it under
//!    distinct aliases.
//! 2. Wait for both servers to accept connections.
//! 3. Start a [`MigrationJob`] from a [`SandboxImage`], pointing it at the
//!    two servers by alias.
//! 4. Drive a [`CompletionWatcher`] until the job completes, fails, or
//!    overruns its deadline.
//!
//! Every container and the network is removed when its handle goes out of
//! scope; tests that care about teardown order call `stop`/`remove`
//! explicitly and the drop guards stay out of the way.

pub mod docker;
pub mod mysql;
pub mod network;
pub mod sandbox;
pub mod watch;

pub use docker::{ContainerState, Docker};
pub use mysql::{MySQLContainer, MySQLEndpoint};
pub use network::TestNetwork;
pub use sandbox::{MigrationJob, SandboxImage, JOB_CONFIG_PATH};
pub use watch::{CompletionWatcher, JobState, JobStateSource, WatchOutcome};
