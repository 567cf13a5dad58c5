//! Abandon token shared between a session and its running stage.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    abandoned: AtomicBool,
    reason: RwLock<Option<String>>,
}

/// A cloneable flag requesting that a session be abandoned.
///
/// Abandoning is idempotent: only the first reason is kept.
#[derive(Debug, Clone, Default)]
pub struct AbandonToken {
    inner: Arc<Inner>,
}

impl AbandonToken {
    /// Creates a new token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests abandonment. Returns true if this call set the flag.
    pub fn abandon(&self, reason: impl Into<String>) -> bool {
        if self
            .inner
            .abandoned
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.inner.reason.write() = Some(reason.into());
            true
        } else {
            false
        }
    }

    /// Returns whether abandonment has been requested.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.inner.abandoned.load(Ordering::SeqCst)
    }

    /// Returns the abandonment reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }
}
