use parking_lot::Mutex;
use std::{
    sync::Arc,
    thread::{self, ThreadId},
};
use tracing::{debug, error};

use crate::{accessor::ContextAccessor, errors::StateErrorKind, message::Message};

/// Request currently being processed on a thread.
pub struct RequestContext {
    original_request: Arc<Message>,
    request: Arc<Message>,
    owner: Mutex<Option<ThreadId>>,
}

impl RequestContext {
    #[inline]
    #[must_use]
    pub fn new(original_request: Arc<Message>, request: Arc<Message>) -> Self {
        Self {
            original_request,
            request,
            owner: Mutex::new(None),
        }
    }

    /// Request scoped values are stored on.
    /// It differs from [`Self::request`] for contexts inherited from an outer invocation.
    #[inline]
    #[must_use]
    pub fn original_request(&self) -> &Arc<Message> {
        &self.original_request
    }

    #[inline]
    #[must_use]
    pub fn request(&self) -> &Arc<Message> {
        &self.request
    }

    #[inline]
    #[must_use]
    pub fn owner(&self) -> Option<ThreadId> {
        *self.owner.lock()
    }

    /// Relinquishes ownership so the context can be resumed on another thread.
    #[inline]
    pub fn release(&self) {
        *self.owner.lock() = None;
    }

    /// Binds the context to the current thread for the duration of `work`.
    ///
    /// The previous owner and the previously bound context are restored on every exit path.
    ///
    /// # Errors
    /// Returns [`StateErrorKind::ScopeTransfer`] if the context is still owned by another thread
    pub fn call<A, W, R>(self: &Arc<Self>, accessor: &A, work: W) -> Result<R, StateErrorKind>
    where
        A: ContextAccessor + ?Sized,
        W: FnOnce() -> R,
    {
        let old_owner = take_ownership(&self.owner)?;
        let previous = accessor.replace_request(Some(self.clone()));
        debug!(request = self.request.id(), "Request context bound");

        let _guard = RestoreRequest {
            context: self,
            accessor,
            old_owner,
            previous,
        };
        Ok(work())
    }
}

/// Claims `owner` for the current thread and returns the previous owner.
pub(crate) fn take_ownership(owner: &Mutex<Option<ThreadId>>) -> Result<Option<ThreadId>, StateErrorKind> {
    let new_owner = thread::current().id();
    let mut owner = owner.lock();
    let old_owner = *owner;
    if old_owner.is_some_and(|old_owner| old_owner != new_owner) {
        let err = StateErrorKind::ScopeTransfer;
        error!("{}", err);
        return Err(err);
    }
    *owner = Some(new_owner);
    Ok(old_owner)
}

struct RestoreRequest<'a, A: ContextAccessor + ?Sized> {
    context: &'a RequestContext,
    accessor: &'a A,
    old_owner: Option<ThreadId>,
    previous: Option<Arc<RequestContext>>,
}

impl<A: ContextAccessor + ?Sized> Drop for RestoreRequest<'_, A> {
    fn drop(&mut self) {
        *self.context.owner.lock() = self.old_owner;
        self.accessor.replace_request(self.previous.take());
        debug!(request = self.context.request.id(), "Request context unbound");
    }
}
