//! A manually reference-counted wrapper for pooled resources.

use std::{
    fmt,
    ops::Deref,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    error::{Error, Result},
    trace::REFERENCE_TRACING_EVENT_TARGET,
};

type Teardown<R> = Box<dyn FnOnce(&R) + Send>;

/// A handle to a pooled resource (a connection, or a source of connections) that may have
/// several owners at once.
///
/// The count starts at one when the handle is created. Each owner obtained via
/// [`ReferenceCounted::retain`] must eventually call [`ReferenceCounted::release`]; the
/// teardown supplied at construction (e.g. checking a connection back into its pool) runs
/// exactly once, on the transition to zero. Unlike an `Arc`, dropping a handle does not
/// release it.
pub struct ReferenceCounted<R> {
    shared: Arc<Shared<R>>,
}

struct Shared<R> {
    resource: R,
    state: Mutex<CountState<R>>,
}

struct CountState<R> {
    count: usize,
    teardown: Option<Teardown<R>>,
}

impl<R> ReferenceCounted<R> {
    /// Wrap `resource` with a count of one and no teardown.
    pub fn new(resource: R) -> Self {
        Self::build(resource, None)
    }

    /// Wrap `resource` with a count of one; `teardown` runs once the count reaches zero.
    pub fn with_release(resource: R, teardown: impl FnOnce(&R) + Send + 'static) -> Self {
        Self::build(resource, Some(Box::new(teardown)))
    }

    fn build(resource: R, teardown: Option<Teardown<R>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                resource,
                state: Mutex::new(CountState { count: 1, teardown }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CountState<R>> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register another owner, returning a handle for it to release independently.
    ///
    /// Fails with an illegal-state error if the resource has already been fully released.
    pub fn retain(&self) -> Result<Self> {
        let mut state = self.lock();
        if state.count == 0 {
            tracing::warn!(
                target: REFERENCE_TRACING_EVENT_TARGET,
                "attempted to retain a resource that was already released"
            );
            return Err(Error::illegal_state(
                "cannot retain a reference that has already been released",
            ));
        }
        state.count += 1;
        Ok(Self {
            shared: self.shared.clone(),
        })
    }

    /// Give up one ownership of the resource, returning the remaining count.
    ///
    /// The teardown runs on the transition to zero, outside of the internal lock. Releasing an
    /// already fully released resource fails with an illegal-state error.
    pub fn release(&self) -> Result<usize> {
        let (remaining, teardown) = {
            let mut state = self.lock();
            if state.count == 0 {
                tracing::warn!(
                    target: REFERENCE_TRACING_EVENT_TARGET,
                    "attempted to release a resource past zero"
                );
                return Err(Error::illegal_state(
                    "cannot release a reference whose count is already zero",
                ));
            }
            state.count -= 1;
            let teardown = if state.count == 0 {
                state.teardown.take()
            } else {
                None
            };
            (state.count, teardown)
        };

        if let Some(teardown) = teardown {
            teardown(&self.shared.resource);
        }
        Ok(remaining)
    }

    /// The current number of owners.
    pub fn count(&self) -> usize {
        self.lock().count
    }

    /// Whether the count has reached zero and the teardown has run.
    pub fn is_released(&self) -> bool {
        self.count() == 0
    }

    /// Whether the two handles refer to the same underlying resource.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.shared, &other.shared)
    }
}

impl<R> Deref for ReferenceCounted<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.shared.resource
    }
}

impl<R> fmt::Debug for ReferenceCounted<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceCounted")
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}

/// Release `handle` if present, logging instead of failing; used on cleanup paths that must not
/// surface errors.
pub(crate) fn release_quietly<R>(handle: Option<ReferenceCounted<R>>) {
    if let Some(handle) = handle {
        if let Err(error) = handle.release() {
            tracing::warn!(
                target: REFERENCE_TRACING_EVENT_TARGET,
                error = %error,
                "failed to release a reference"
            );
        }
    }
}
