//! Task spawning for callback-style operations and background refreshes.
//!
//! The client never blocks the caller: request chains run as tasks on a Tokio
//! runtime, either one supplied through the settings or the runtime the
//! client was created on.

use std::future::Future;

use crate::error::{Error, Result};

/// Spawns request chains onto a Tokio runtime.
#[derive(Debug, Clone)]
pub struct TaskSpawner {
    handle: tokio::runtime::Handle,
}

impl TaskSpawner {
    /// Use the runtime the caller is running on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when called outside a Tokio runtime.
    pub fn current() -> Result<Self> {
        tokio::runtime::Handle::try_current()
            .map(Self::from_handle)
            .map_err(|e| Error::invalid_argument(format!("no runtime to run requests on: {e}")))
    }

    /// Use a specific runtime.
    #[must_use]
    pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Spawn a background task that runs to completion.
    ///
    /// The future must be `Send + 'static` and return `()`. Results travel
    /// back through the callback the future owns.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        drop(self.handle.spawn(future));
    }
}
