//! Live-session accounting.
//!
//! Every accepted connection gets a [`SessionGuard`]; the count drops when the
//! session that owns the guard is dropped. Shutdown drains on this count and
//! tests use it to prove sessions are released.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Identifier used to correlate a session's log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Inner {
    active: AtomicUsize,
    next_id: AtomicU64,
    idle: Notify,
}

/// Counts sessions that have been accepted but not yet dropped.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    inner: Arc<Inner>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session. The returned guard must live as long as it.
    pub fn track(&self) -> SessionGuard {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        // Ids only need to be unique.
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        SessionGuard {
            inner: Arc::clone(&self.inner),
            id: SessionId(id),
        }
    }

    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Total sessions ever started.
    pub fn started(&self) -> u64 {
        self.inner.next_id.load(Ordering::Relaxed)
    }

    /// Resolves once no session is live.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Keeps one session counted as live until dropped.
#[derive(Debug)]
pub struct SessionGuard {
    inner: Arc<Inner>,
    id: SessionId,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
