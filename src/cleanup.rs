//! Scoped cleanup for cluster resources
//!
//! Each step that creates something pushes its teardown onto a
//! [`CleanupStack`] as soon as the create succeeds. Running the stack pops
//! actions in reverse order and keeps going past failures, so a failing
//! teardown never leaks the resources acquired before it.

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, warn};

use crate::{Error, Result};

type CleanupFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type CleanupAction = Box<dyn FnOnce() -> CleanupFuture + Send>;

/// LIFO stack of deferred async cleanup actions.
///
/// An action returning `Err` is a hard failure: the remaining actions still
/// run, and [`CleanupStack::run`] reports every failure at the end. Actions
/// that only want to log a problem should log it and return `Ok`.
#[derive(Default)]
pub struct CleanupStack {
    actions: Vec<(String, CleanupAction)>,
}

impl CleanupStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `action` to run during [`CleanupStack::run`].
    pub fn defer<F, Fut>(&mut self, description: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let description = description.into();
        debug!(cleanup = %description, "cleanup registered");
        let boxed: CleanupAction = Box::new(move || -> CleanupFuture { Box::pin(action()) });
        self.actions.push((description, boxed));
    }

    /// Number of pending actions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action, most recently registered first.
    pub async fn run(mut self) -> Result<()> {
        let mut failures = Vec::new();
        while let Some((description, action)) = self.actions.pop() {
            debug!(cleanup = %description, "running cleanup");
            if let Err(e) = action().await {
                warn!(cleanup = %description, error = %e, "cleanup failed");
                failures.push(format!("{description}: {e}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Cleanup { failures })
        }
    }
}

impl std::fmt::Debug for CleanupStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.actions.iter().map(|(d, _)| d))
            .finish()
    }
}
