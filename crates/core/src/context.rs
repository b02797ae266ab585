//! Execution context: an optional deadline plus an optional cancellation
//! signal, passed to every `prompt()` call and down to the service.
//!
//! Contexts are cheap to clone. Deriving a context never loosens the parent:
//! a child deadline is the earlier of both, and cancelling a parent cancels
//! every context derived from it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::ContextError;

/// Deadline and cancellation scope of a call.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<Arc<CancelState>>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a context that expires at `deadline`, or earlier if the parent does.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            deadline: Some(deadline),
            cancel: self.cancel.clone(),
        }
    }

    /// Derive a cancellable context. The handle cancels the returned context
    /// and everything derived from it, never the parent.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let state = Arc::new(CancelState::default());

        if let Some(parent) = &self.cancel {
            let mut children = parent.children.lock().unwrap_or_else(PoisonError::into_inner);
            // drop children that have already gone away
            children.retain(|child| child.strong_count() > 0);
            children.push(Arc::downgrade(&state));
            drop(children);
            // parent may have fired before the child was registered
            if parent.is_cancelled() {
                state.cancel();
            }
        }

        let ctx = Self {
            deadline: self.deadline,
            cancel: Some(state.clone()),
        };
        (ctx, CancelHandle { state })
    }

    /// When the context expires, if ever.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if self.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Whether the context or one of its ancestors was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|state| state.is_cancelled())
    }

    /// Sleep for `duration`, returning early with an error when the context is
    /// cancelled or its deadline passes first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ContextError> {
        self.sleep_until(Instant::now() + duration).await
    }

    /// Like [`sleep`](Self::sleep) with an absolute wake-up time.
    pub async fn sleep_until(&self, until: Instant) -> Result<(), ContextError> {
        if let Some(err) = self.err() {
            return Err(err);
        }

        let (wake, expires) = match self.deadline {
            Some(deadline) if deadline < until => (deadline, true),
            _ => (until, false),
        };

        let cancelled = async {
            match &self.cancel {
                Some(state) => state.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = tokio::time::sleep_until(wake) => {
                if expires {
                    Err(ContextError::DeadlineExceeded)
                } else {
                    Ok(())
                }
            }
            _ = cancelled => Err(ContextError::Cancelled),
        }
    }
}

/// Cancels the context it was created with.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    /// Cancel the context and wake every waiter. Idempotent.
    pub fn cancel(&self) {
        self.state.cancel();
    }
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<CancelState>>>,
}

impl CancelState {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notify.notify_waiters();

        let children = std::mem::take(&mut *self.children.lock().unwrap_or_else(PoisonError::into_inner));
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }

    async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn background_sleep_completes() {
        let ctx = Context::background();
        assert!(ctx.err().is_none());
        assert!(ctx.sleep(Duration::from_secs(3600)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cuts_sleep_short() {
        let ctx = Context::background().with_timeout(Duration::from_millis(100));
        let start = Instant::now();

        let err = ctx.sleep(Duration::from_secs(10)).await.unwrap_err();

        assert_eq!(err, ContextError::DeadlineExceeded);
        assert_eq!(start.elapsed(), Duration::from_millis(100));
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn child_deadline_never_exceeds_parent() {
        let parent = Context::background().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_wakes_sleeper() {
        let (ctx, handle) = Context::background().with_cancel();

        let sleeper = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.sleep(Duration::from_secs(60)).await }
        });
        tokio::task::yield_now().await;
        handle.cancel();

        assert_eq!(sleeper.await.unwrap(), Err(ContextError::Cancelled));
        assert_eq!(ctx.err(), Some(ContextError::Cancelled));
    }

    #[tokio::test]
    async fn cancelling_parent_cancels_children() {
        let (parent, handle) = Context::background().with_cancel();
        let (child, _child_handle) = parent.with_timeout(Duration::from_secs(5)).with_cancel();

        handle.cancel();
        assert!(child.is_cancelled());
        assert_eq!(child.sleep(Duration::from_secs(1)).await, Err(ContextError::Cancelled));
    }

    #[tokio::test]
    async fn cancelling_child_leaves_parent_live() {
        let (parent, _handle) = Context::background().with_cancel();
        let (child, child_handle) = parent.with_cancel();

        child_handle.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn dropped_children_are_not_retained() {
        let (parent, _handle) = Context::background().with_cancel();

        for _ in 0..10_000 {
            let (child, _child_handle) = parent.with_cancel();
            drop(child);
        }

        let state = parent.cancel.as_ref().unwrap();
        assert!(state.children.lock().unwrap().len() <= 1);

        let (_live, _live_handle) = parent.with_cancel();
        let children = state.children.lock().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].strong_count(), 2);
    }
}
