//! Cooperative cancellation signal
//!
//! A first-class token checked at turn boundaries and between tool calls
//! (spec §5, §9 "Cancellation propagation"), forwarded to provider requests
//! and to child agents spawned via the spawn-agent tool.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A cloneable, cooperative cancellation signal.
///
/// Cloning shares the same underlying flag: tripping any clone trips all of
/// them. There is no "uncancel" — once tripped, a [`CancellationSignal`]
/// stays tripped for its lifetime.
#[derive(Clone, Debug, Default)]
pub struct CancellationSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the signal. Idempotent.
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolve once the signal is tripped. A no-op future if already tripped.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.notify.notified().await;
    }

    /// Derive a child signal that is independently cancellable but also
    /// cancelled whenever this one is (used by the spawn-agent tool so a
    /// parent cancellation always propagates, without the child cancelling
    /// its parent).
    pub fn child(&self) -> Self {
        let child = CancellationSignal::new();
        if self.is_cancelled() {
            child.cancel();
            return child;
        }
        let parent = self.clone();
        let linked = child.clone();
        tokio::spawn(async move {
            parent.cancelled().await;
            linked.cancel();
        });
        child
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_is_observed() {
        let sig = CancellationSignal::new();
        assert!(!sig.is_cancelled());
        sig.cancel();
        assert!(sig.is_cancelled());
        sig.cancelled().await;
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let sig = CancellationSignal::new();
        let clone = sig.clone();
        clone.cancel();
        assert!(sig.is_cancelled());
    }

    #[tokio::test]
    async fn child_inherits_parent_cancellation() {
        let parent = CancellationSignal::new();
        let child = parent.child();
        assert!(!child.is_cancelled());
        parent.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), child.cancelled())
            .await
            .expect("child should observe parent cancellation");
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_parent_yields_cancelled_child() {
        let parent = CancellationSignal::new();
        parent.cancel();
        let child = parent.child();
        assert!(child.is_cancelled());
    }
}
