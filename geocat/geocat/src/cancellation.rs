//! Cooperative cancellation of request chains.
//!
//! A [`CancellationContext`] is shared by every step of one logical request
//! (endpoint lookup, version lookup, index fetch, blob fetch). Each step
//! registers the network request it is about to issue; cancelling the context
//! flips a one-way flag, asks the transport to cancel the registered request,
//! and cancels any child contexts. Steps check the flag before starting, so a
//! cancel that lands between two steps stops the chain at the next one.
//!
//! The caller holds a [`CancellationToken`], which can only cancel.

use crate::error::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;

type CancelHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct State {
    cancelled: bool,
    /// Hook cancelling the in-flight operation, tagged with its registration.
    in_flight: Option<(u64, CancelHook)>,
    next_registration: u64,
    children: Vec<Weak<Inner>>,
}

struct Inner {
    state: Mutex<State>,
    cancelled_tx: watch::Sender<bool>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared cancellation state of one request chain.
///
/// Cloning is cheap and yields a handle to the same state.
#[derive(Clone)]
pub struct CancellationContext {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CancellationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationContext")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Default for CancellationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationContext {
    /// Create a fresh, uncancelled context.
    #[must_use]
    pub fn new() -> Self {
        let (cancelled_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                cancelled_tx,
            }),
        }
    }

    /// Whether the context has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().cancelled
    }

    /// Return [`Error::Cancelled`] if the context has been cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Cancel the chain.
    ///
    /// Idempotent. Invokes the registered in-flight hook, if any, and cancels
    /// every child context. Hooks run outside the internal lock.
    pub fn cancel(&self) {
        let (hook, children) = {
            let mut state = self.inner.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            (
                state.in_flight.take().map(|(_, hook)| hook),
                std::mem::take(&mut state.children),
            )
        };

        self.inner.cancelled_tx.send_replace(true);

        if let Some(hook) = hook {
            hook();
        }
        for child in children.iter().filter_map(Weak::upgrade) {
            CancellationContext { inner: child }.cancel();
        }
    }

    /// Register the cancel hook of the operation about to start.
    ///
    /// Returns [`Error::Cancelled`] without registering if the context is
    /// already cancelled. The hook is dropped, uninvoked, when the returned
    /// guard goes out of scope.
    pub fn execute_or_cancelled<F>(&self, cancel_hook: F) -> Result<InFlight>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.lock();
        if state.cancelled {
            return Err(Error::Cancelled);
        }
        let registration = state.next_registration;
        state.next_registration += 1;
        if state.in_flight.is_some() {
            tracing::warn!("replacing an in-flight operation on the same chain");
        }
        state.in_flight = Some((registration, Box::new(cancel_hook)));
        Ok(InFlight {
            context: self.clone(),
            registration,
        })
    }

    /// Resolve once the context is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.cancelled_tx.subscribe();
        // The sender lives as long as `self`, so this only ends on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Create a context that is cancelled whenever this one is.
    ///
    /// Cancelling the child does not affect the parent.
    #[must_use]
    pub fn child(&self) -> CancellationContext {
        let child = CancellationContext::new();
        let parent_cancelled = {
            let mut state = self.inner.lock();
            if !state.cancelled {
                state.children.retain(|weak| weak.strong_count() > 0);
                state.children.push(Arc::downgrade(&child.inner));
            }
            state.cancelled
        };
        if parent_cancelled {
            child.cancel();
        }
        child
    }

    /// A caller-facing token for this context.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            context: self.clone(),
        }
    }
}

/// Registration of an in-flight operation; clears the hook on drop.
#[must_use = "dropping the guard unregisters the operation immediately"]
pub struct InFlight {
    context: CancellationContext,
    registration: u64,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut state = self.context.inner.lock();
        if state
            .in_flight
            .as_ref()
            .is_some_and(|(registration, _)| *registration == self.registration)
        {
            state.in_flight = None;
        }
    }
}

/// Handle returned to callers of asynchronous operations.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    context: CancellationContext,
}

impl CancellationToken {
    /// Cancel the operation. Safe to call repeatedly and from any thread.
    pub fn cancel(&self) {
        self.context.cancel();
    }

    /// Whether the operation has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.context.is_cancelled()
    }
}
