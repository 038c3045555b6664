//! Completion counting for connector shutdown
//!
//! A supervisor hands each connector a [`CompletionGuard`] taken from a shared
//! [`WaitGroup`], then awaits [`WaitGroup::wait`] before exiting. Each guard
//! decrements the count exactly once, when it is released or dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    count: AtomicUsize,
    notify: Notify,
}

/// Shared counter of outstanding connectors
#[derive(Debug, Clone, Default)]
pub struct WaitGroup {
    inner: Arc<Inner>,
}

impl WaitGroup {
    /// Create an empty wait group
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one more outstanding party
    pub fn add(&self) -> CompletionGuard {
        self.inner.count.fetch_add(1, Ordering::SeqCst);
        CompletionGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of guards not yet released
    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Wait until every guard has been released
    pub async fn wait(&self) {
        loop {
            // Register interest before checking, so a release in between is seen.
            let notified = self.inner.notify.notified();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// One outstanding party of a [`WaitGroup`]
#[derive(Debug)]
pub struct CompletionGuard {
    inner: Arc<Inner>,
}

impl CompletionGuard {
    /// Signal completion
    pub fn done(self) {
        drop(self);
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.notify.notify_waiters();
        }
    }
}
