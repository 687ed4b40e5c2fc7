use core::any::Any;
use parking_lot::Mutex;
use std::{sync::Arc, thread::ThreadId};
use tracing::{debug, error, info_span};

use crate::{
    accessor::ContextAccessor,
    any::RcAny,
    cache::{self, Cached},
    context::take_ownership,
    errors::{SeedErrorKind, StateErrorKind},
    key::ScopeKey,
};

/// Values a synthetic request scope starts with.
#[derive(Clone, Default)]
pub struct Seeds {
    values: Vec<(ScopeKey, Option<RcAny>)>,
}

impl Seeds {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn insert<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.insert_any(ScopeKey::of::<T>(), Some(Arc::new(value)))
    }

    #[inline]
    #[must_use]
    pub fn insert_qualified<T: Send + Sync + 'static>(self, qualifier: &'static str, value: T) -> Self {
        self.insert_any(ScopeKey::qualified::<T>(qualifier), Some(Arc::new(value)))
    }

    /// Seeds `key` with a null value.
    #[inline]
    #[must_use]
    pub fn insert_null(self, key: ScopeKey) -> Self {
        self.insert_any(key, None)
    }

    /// Seeds `key` with a type-erased value.
    /// The value is checked against the key type by [`crate::RequestScope::scope_request`].
    #[inline]
    #[must_use]
    pub fn insert_any(mut self, key: ScopeKey, value: Option<Arc<dyn Any + Send + Sync>>) -> Self {
        self.values.push((key, value));
        self
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Checks every value against its key type and canonicalizes nulls.
    pub(crate) fn validate(self) -> Result<cache::Map, SeedErrorKind> {
        let mut map = cache::Map::new();
        for (key, value) in self.values {
            if let Some(value) = &value {
                if !key.type_info().is_instance(&**value) {
                    let err = SeedErrorKind::IncompatibleValue {
                        key,
                        actual: (**value).type_id(),
                    };
                    error!("{}", err);
                    return Err(err);
                }
            }
            map.insert(key, Cached::from_option(value));
        }
        Ok(map)
    }
}

/// Thread-bound substitute for a request context, used outside of live requests.
pub struct FallbackContext {
    pub(crate) map: Mutex<cache::Map>,
    owner: Mutex<Option<ThreadId>>,
}

impl FallbackContext {
    #[inline]
    #[must_use]
    pub(crate) fn new(map: cache::Map) -> Self {
        Self {
            map: Mutex::new(map),
            owner: Mutex::new(None),
        }
    }

    #[inline]
    #[must_use]
    pub fn owner(&self) -> Option<ThreadId> {
        *self.owner.lock()
    }

    /// Binds the context to the current thread for the duration of `work`.
    ///
    /// # Errors
    /// Returns [`StateErrorKind::ScopeTransfer`] if the context is still owned by another thread
    pub fn call<A, W, R>(self: &Arc<Self>, accessor: &A, work: W) -> Result<R, StateErrorKind>
    where
        A: ContextAccessor + ?Sized,
        W: FnOnce() -> R,
    {
        let old_owner = take_ownership(&self.owner)?;
        let previous = accessor.replace_fallback(Some(self.clone()));
        debug!("Fallback context bound");

        let _guard = RestoreFallback {
            context: self,
            accessor,
            old_owner,
            previous,
        };
        Ok(work())
    }
}

struct RestoreFallback<'a, A: ContextAccessor + ?Sized> {
    context: &'a FallbackContext,
    accessor: &'a A,
    old_owner: Option<ThreadId>,
    previous: Option<Arc<FallbackContext>>,
}

impl<A: ContextAccessor + ?Sized> Drop for RestoreFallback<'_, A> {
    fn drop(&mut self) {
        *self.context.owner.lock() = self.old_owner;
        self.accessor.replace_fallback(self.previous.take());
        debug!("Fallback context unbound");
    }
}

/// Unit of work that runs inside a synthetic request scope.
///
/// It has no scheduling semantics: run it inline, move it to another thread or hand it to a pool.
/// Every call shares the same seeded context, so values cached by one call are seen by the next,
/// also when the next call runs on another thread.
#[must_use = "scoped work does nothing until called"]
pub struct ScopedWork<W> {
    pub(crate) work: W,
    pub(crate) context: Arc<FallbackContext>,
    pub(crate) accessor: Arc<dyn ContextAccessor>,
}

impl<W> ScopedWork<W> {
    #[inline]
    #[must_use]
    pub fn context(&self) -> &Arc<FallbackContext> {
        &self.context
    }

    fn check_not_scoped(&self) -> Result<(), StateErrorKind> {
        if self.accessor.request().is_some() {
            let err = StateErrorKind::RequestInProgress;
            error!("{}", err);
            return Err(err);
        }
        if self.accessor.fallback().is_some() {
            let err = StateErrorKind::ScopeInProgress;
            error!("{}", err);
            return Err(err);
        }
        Ok(())
    }
}

impl<W, R> ScopedWork<W>
where
    W: Fn() -> R,
{
    /// # Errors
    /// - Returns [`StateErrorKind::RequestInProgress`] if a request context is bound to the current thread
    /// - Returns [`StateErrorKind::ScopeInProgress`] if a fallback context is bound to the current thread
    /// - Returns [`StateErrorKind::ScopeTransfer`] if another thread is still running this work
    pub fn call(&self) -> Result<R, StateErrorKind> {
        let span = info_span!("scope_request");
        let _guard = span.enter();

        self.check_not_scoped()?;
        self.context.call(&*self.accessor, &self.work)
    }
}

impl<W, R> ScopedWork<W>
where
    W: FnOnce() -> R,
{
    /// Runs work that can only be called once.
    ///
    /// # Errors
    /// See [`ScopedWork::call`]
    pub fn call_once(self) -> Result<R, StateErrorKind> {
        let span = info_span!("scope_request");
        let _guard = span.enter();

        self.check_not_scoped()?;
        self.context.call(&*self.accessor, self.work)
    }
}

impl<W: Clone> Clone for ScopedWork<W> {
    fn clone(&self) -> Self {
        Self {
            work: self.work.clone(),
            context: self.context.clone(),
            accessor: self.accessor.clone(),
        }
    }
}
