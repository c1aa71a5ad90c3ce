//! Run-all-and-report scenario execution
//!
//! Every scenario runs to completion even when earlier ones fail; the
//! summary is logged at the end and [`TestHarness::finish`] turns any
//! failure into an error.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::{error, info};

use crate::{Error, Result};

const MAX_SUMMARY_ERROR_LEN: usize = 200;

/// Outcome of one scenario.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Ran and passed
    Passed,
    /// Ran and failed, with the error message
    Failed(String),
    /// Not run, with the reason
    Skipped(String),
}

/// Result of one scenario.
#[derive(Clone, Debug)]
pub struct TestResult {
    /// Scenario name
    pub name: String,
    /// What happened
    pub outcome: Outcome,
    /// Wall time spent
    pub duration: Duration,
}

impl TestResult {
    /// True unless the scenario failed
    pub fn passed(&self) -> bool {
        !matches!(self.outcome, Outcome::Failed(_))
    }
}

/// Collects scenario results; cheap to clone and share across tasks.
#[derive(Clone)]
pub struct TestHarness {
    suite: String,
    results: Arc<Mutex<Vec<TestResult>>>,
}

impl TestHarness {
    /// Harness for the named suite
    pub fn new(suite: &str) -> Self {
        Self {
            suite: suite.to_string(),
            results: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Run one scenario, recording errors and panics as failures.
    pub async fn run<F, Fut>(&self, name: &str, f: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        info!(scenario = %name, "running scenario");
        let start = Instant::now();
        let result = AssertUnwindSafe(f()).catch_unwind().await;
        let outcome = match result {
            Ok(Ok(())) => Outcome::Passed,
            Ok(Err(e)) => Outcome::Failed(e.to_string()),
            Err(panic) => {
                let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                Outcome::Failed(format!("PANIC: {msg}"))
            }
        };
        if let Outcome::Failed(ref e) = outcome {
            error!(scenario = %name, error = %e, "scenario failed");
        }
        let passed = outcome == Outcome::Passed;
        self.record(name, outcome, start.elapsed());
        passed
    }

    /// Record a scenario that was not run.
    pub fn skip(&self, name: &str, reason: impl Into<String>) {
        let reason = reason.into();
        info!(scenario = %name, reason = %reason, "skipping scenario");
        self.record(name, Outcome::Skipped(reason), Duration::ZERO);
    }

    /// Record an outcome directly.
    pub fn record(&self, name: &str, outcome: Outcome, duration: Duration) {
        self.lock().push(TestResult {
            name: name.to_string(),
            outcome,
            duration,
        });
    }

    /// Snapshot of the results so far
    pub fn results(&self) -> Vec<TestResult> {
        self.lock().clone()
    }

    /// Log the summary; fails if any scenario failed.
    pub fn finish(&self) -> Result<()> {
        let results = self.lock();
        let total_duration: Duration = results.iter().map(|r| r.duration).sum();
        let passed = results
            .iter()
            .filter(|r| r.outcome == Outcome::Passed)
            .count();
        let skipped = results
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Skipped(_)))
            .count();
        let failed: Vec<String> = results
            .iter()
            .filter(|r| !r.passed())
            .map(|r| r.name.clone())
            .collect();

        info!("========================================");
        info!("  {}", self.suite.to_uppercase());
        info!("========================================");
        for r in results.iter() {
            let tag = match r.outcome {
                Outcome::Passed => "PASS",
                Outcome::Failed(_) => "FAIL",
                Outcome::Skipped(_) => "SKIP",
            };
            info!("  {tag}  {:60} {:.1}s", r.name, r.duration.as_secs_f64());
            match &r.outcome {
                Outcome::Failed(e) | Outcome::Skipped(e) => {
                    info!("        -> {}", truncate(e, MAX_SUMMARY_ERROR_LEN))
                }
                Outcome::Passed => {}
            }
        }
        info!("----------------------------------------");
        info!(
            "  {} passed, {} failed, {} skipped ({:.1}s total)",
            passed,
            failed.len(),
            skipped,
            total_duration.as_secs_f64()
        );
        info!("========================================");

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::SuiteFailed {
                failed: failed.len(),
                names: failed,
            })
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TestResult>> {
        // A panic while holding the lock cannot leave a half-pushed result.
        self.results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
