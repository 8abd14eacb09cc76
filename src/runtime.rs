use std::future::Future;

use tokio::{runtime::Handle, task::JoinHandle};

/// Spawn a task in the background to run a future.
///
/// Returns `None` when called outside of a tokio runtime, in which case the future is dropped
/// without being polled.
pub(crate) fn spawn<F, O>(fut: F) -> Option<JoinHandle<O>>
where
    F: Future<Output = O> + Send + 'static,
    O: Send + 'static,
{
    Handle::try_current().ok().map(|handle| handle.spawn(fut))
}

/// Whether the current thread is running inside a tokio runtime.
#[cfg(feature = "sync")]
pub(crate) fn in_runtime() -> bool {
    Handle::try_current().is_ok()
}

#[cfg(feature = "sync")]
pub(crate) fn block_on<F, T>(fut: F) -> T
where
    F: Future<Output = T>,
{
    crate::sync::TOKIO_RUNTIME.block_on(fut)
}
