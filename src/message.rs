use core::{
    cell::RefCell,
    fmt::{self, Debug, Formatter},
    sync::atomic::{AtomicU64, Ordering},
};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::sync::Arc;

use crate::{
    any::RcAny,
    cache::{self, Cached, Lookup},
    interceptor::InterceptorChain,
    key::ScopeKey,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Request being processed by the transport.
///
/// The message is owned by the transport; scoping only stores attributes on it.
/// All attribute access for scoping goes through [`Message::lock`], which is
/// reentrant so creators may resolve other scoped keys on the same thread.
pub struct Message {
    id: u64,
    attributes: ReentrantMutex<RefCell<cache::Map>>,
    chain: Mutex<Option<Arc<InterceptorChain>>>,
    content: Mutex<Option<RcAny>>,
    response: Mutex<Option<RcAny>>,
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Message {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            attributes: ReentrantMutex::new(RefCell::new(cache::Map::new())),
            chain: Mutex::new(None),
            content: Mutex::new(None),
            response: Mutex::new(None),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_content<T: Send + Sync + 'static>(content: T) -> Self {
        let message = Self::new();
        message.set_content(content);
        message
    }

    /// Identity of the message, unique for the process lifetime.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, RefCell<cache::Map>> {
        self.attributes.lock()
    }

    /// Returns the attribute stored under `key`.
    /// `None` is returned both for missing attributes and for attributes stored as null.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, key: &ScopeKey) -> Option<Arc<T>> {
        let guard = self.lock();
        let attributes = guard.borrow();
        match cache::lookup::<T>(&attributes, key) {
            Lookup::Hit(value) => value,
            Lookup::Missing | Lookup::IncorrectType => None,
        }
    }

    #[inline]
    pub fn put<T: Send + Sync + 'static>(&self, key: ScopeKey, value: T) {
        self.put_cached(key, Cached::Value(Arc::new(value)));
    }

    #[inline]
    pub fn put_null(&self, key: ScopeKey) {
        self.put_cached(key, Cached::Null);
    }

    pub(crate) fn put_cached(&self, key: ScopeKey, value: Cached) {
        let guard = self.lock();
        guard.borrow_mut().insert(key, value);
    }

    #[must_use]
    pub fn contains(&self, key: &ScopeKey) -> bool {
        self.lock().borrow().contains_key(key)
    }

    /// Removes the attribute, returns `true` if it was present.
    pub fn remove(&self, key: &ScopeKey) -> bool {
        self.lock().borrow_mut().remove(key).is_some()
    }

    #[inline]
    #[must_use]
    pub fn interceptor_chain(&self) -> Option<Arc<InterceptorChain>> {
        self.chain.lock().clone()
    }

    #[inline]
    pub(crate) fn set_interceptor_chain(&self, chain: Arc<InterceptorChain>) {
        *self.chain.lock() = Some(chain);
    }

    #[inline]
    pub fn set_content<T: Send + Sync + 'static>(&self, content: T) {
        *self.content.lock() = Some(Arc::new(content));
    }

    #[must_use]
    pub fn content<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.content.lock().clone().and_then(|content| content.downcast().ok())
    }

    #[inline]
    pub(crate) fn set_response(&self, response: Option<RcAny>) {
        *self.response.lock() = response;
    }

    #[must_use]
    pub fn response<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.response.lock().clone().and_then(|response| response.downcast().ok())
    }
}

impl Debug for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message").field("id", &self.id).finish_non_exhaustive()
    }
}
