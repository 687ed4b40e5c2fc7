use core::cell::RefCell;
use std::sync::Arc;

use crate::{context::RequestContext, fallback::FallbackContext};

/// Gives access to the contexts bound to the current thread.
///
/// Scope machinery never touches thread-local storage directly, so an accessor
/// can be swapped or reset in tests.
pub trait ContextAccessor: Send + Sync + 'static {
    #[must_use]
    fn request(&self) -> Option<Arc<RequestContext>>;

    /// Binds `context` and returns the previously bound one.
    fn replace_request(&self, context: Option<Arc<RequestContext>>) -> Option<Arc<RequestContext>>;

    #[must_use]
    fn fallback(&self) -> Option<Arc<FallbackContext>>;

    /// Binds `context` and returns the previously bound one.
    fn replace_fallback(&self, context: Option<Arc<FallbackContext>>) -> Option<Arc<FallbackContext>>;

    fn clear(&self) {
        drop(self.replace_request(None));
        drop(self.replace_fallback(None));
    }
}

thread_local! {
    static REQUEST_CONTEXT: RefCell<Option<Arc<RequestContext>>> = const { RefCell::new(None) };
    static FALLBACK_CONTEXT: RefCell<Option<Arc<FallbackContext>>> = const { RefCell::new(None) };
}

/// Accessor backed by thread-local slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadLocalAccessor;

impl ContextAccessor for ThreadLocalAccessor {
    #[inline]
    fn request(&self) -> Option<Arc<RequestContext>> {
        REQUEST_CONTEXT.with(|slot| slot.borrow().clone())
    }

    #[inline]
    fn replace_request(&self, context: Option<Arc<RequestContext>>) -> Option<Arc<RequestContext>> {
        REQUEST_CONTEXT.with(|slot| slot.replace(context))
    }

    #[inline]
    fn fallback(&self) -> Option<Arc<FallbackContext>> {
        FALLBACK_CONTEXT.with(|slot| slot.borrow().clone())
    }

    #[inline]
    fn replace_fallback(&self, context: Option<Arc<FallbackContext>>) -> Option<Arc<FallbackContext>> {
        FALLBACK_CONTEXT.with(|slot| slot.replace(context))
    }
}
