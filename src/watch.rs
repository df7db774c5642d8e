//! Poll-until-terminal watcher for the migration job
//!
//! The job container offers no completion event to subscribe to, only state
//! queries, so the watcher polls on a fixed interval and races the polls
//! against a one-shot deadline.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Last observed state of the job container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Exited(i64),
}

/// State queries the watcher runs against.
///
/// Implemented by [`MigrationJob`]; tests substitute scripted fakes.
///
/// [`MigrationJob`]: crate::sandbox::MigrationJob
#[async_trait]
pub trait JobStateSource {
    /// Current state of the job.
    async fn state(&self) -> Result<JobState>;

    /// Collected log output, used as the diagnostic payload on failure.
    async fn diagnostics(&self) -> Result<String>;
}

/// Terminal observation of a watched job.
#[derive(Debug)]
pub enum WatchOutcome {
    /// The job exited with code 0.
    Completed,
    /// The job exited with a non-zero code; `logs` holds its output.
    Failed { exit_code: i64, logs: String },
    /// No terminal state was observed before the deadline.
    TimedOut,
}

impl WatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WatchOutcome::Completed)
    }
}

/// Watches a job until it completes, fails, or overruns the deadline.
pub struct CompletionWatcher {
    tick: Duration,
    deadline: Duration,
}

impl Default for CompletionWatcher {
    /// 10 s between polls, 5 min overall deadline.
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(10),
            deadline: Duration::from_secs(300),
        }
    }
}

impl CompletionWatcher {
    pub fn new(tick: Duration, deadline: Duration) -> Self {
        Self { tick, deadline }
    }

    /// Polls `job` until the first terminal observation.
    ///
    /// Returns [`WatchOutcome::Completed`] only after a poll observed the
    /// job not running with exit code 0, and never polls again once a
    /// terminal state was observed. The deadline fires regardless of tick
    /// state.
    pub async fn watch<J>(&self, job: &J) -> Result<WatchOutcome>
    where
        J: JobStateSource + Sync + ?Sized,
    {
        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);
        // First poll one full period after start; the job was only just
        // started and cannot usefully be inspected earlier.
        let mut ticks = tokio::time::interval_at(Instant::now() + self.tick, self.tick);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    info!("Job did not finish within {:?}", self.deadline);
                    return Ok(WatchOutcome::TimedOut);
                }
                _ = ticks.tick() => match job.state().await? {
                    JobState::Running => debug!("Job still running"),
                    JobState::Exited(0) => {
                        info!("Job exited with code 0");
                        return Ok(WatchOutcome::Completed);
                    }
                    JobState::Exited(exit_code) => {
                        // A log-collection error must not mask the failure itself
                        let logs = job
                            .diagnostics()
                            .await
                            .unwrap_or_else(|e| format!("failed to collect job logs: {e}"));
                        return Ok(WatchOutcome::Failed { exit_code, logs });
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed sequence of states, holding on the last one.
    struct ScriptedJob {
        states: Mutex<VecDeque<JobState>>,
        polls: AtomicUsize,
        logs: String,
    }

    impl ScriptedJob {
        fn new(states: impl IntoIterator<Item = JobState>, logs: &str) -> Self {
            Self {
                states: Mutex::new(states.into_iter().collect()),
                polls: AtomicUsize::new(0),
                logs: logs.to_string(),
            }
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobStateSource for ScriptedJob {
        async fn state(&self) -> Result<JobState> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut states = self.states.lock().unwrap();
            let state = if states.len() > 1 {
                states.pop_front().unwrap()
            } else {
                *states.front().expect("scripted job needs at least one state")
            };
            Ok(state)
        }

        async fn diagnostics(&self) -> Result<String> {
            Ok(self.logs.clone())
        }
    }

    struct BrokenJob;

    #[async_trait]
    impl JobStateSource for BrokenJob {
        async fn state(&self) -> Result<JobState> {
            bail!("inspect failed")
        }

        async fn diagnostics(&self) -> Result<String> {
            Ok(String::new())
        }
    }

    fn watcher() -> CompletionWatcher {
        CompletionWatcher::new(Duration::from_secs(10), Duration::from_secs(300))
    }

    #[tokio::test(start_paused = true)]
    async fn reports_success_on_clean_exit_and_stops_polling() {
        let job = ScriptedJob::new([JobState::Running, JobState::Exited(0)], "");

        let outcome = watcher().watch(&job).await.unwrap();

        assert!(outcome.is_success());
        // Second poll saw the terminal state; nothing polled after it
        assert_eq!(job.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reports_success_for_exit_within_first_tick() {
        let job = ScriptedJob::new([JobState::Exited(0)], "");

        let outcome = watcher().watch(&job).await.unwrap();

        assert!(matches!(outcome, WatchOutcome::Completed));
        assert_eq!(job.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn surfaces_logs_on_nonzero_exit() {
        let job = ScriptedJob::new(
            [JobState::Running, JobState::Exited(137)],
            "pre-crash output",
        );

        let outcome = watcher().watch(&job).await.unwrap();

        match outcome {
            WatchOutcome::Failed { exit_code, logs } => {
                assert_eq!(exit_code, 137);
                assert!(logs.contains("pre-crash output"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(job.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_job_never_finishes() {
        let job = ScriptedJob::new([JobState::Running], "");
        let watcher = CompletionWatcher::new(Duration::from_secs(10), Duration::from_secs(45));

        let outcome = watcher.watch(&job).await.unwrap();

        // A job that was running at every observation must never be
        // reported as completed
        assert!(matches!(outcome, WatchOutcome::TimedOut));
        // Ticks at 10, 20, 30 and 40 s; the deadline fires at 45 s
        assert_eq!(job.polls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn no_timeout_when_terminal_before_deadline() {
        let job = ScriptedJob::new([JobState::Exited(1)], "boom");
        let watcher = CompletionWatcher::new(Duration::from_secs(10), Duration::from_secs(45));

        let outcome = watcher.watch(&job).await.unwrap();

        assert!(matches!(outcome, WatchOutcome::Failed { exit_code: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn propagates_state_query_errors() {
        let outcome = watcher().watch(&BrokenJob).await;

        assert!(outcome.is_err());
    }
}
