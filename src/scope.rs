use core::{
    any::type_name,
    fmt::{self, Debug, Display, Formatter},
};
use std::sync::Arc;
use tracing::{debug, error, info_span};

use crate::{
    accessor::{ContextAccessor, ThreadLocalAccessor},
    any::{RcAny, TypeInfo},
    binding::{Binding, Bindings},
    cache::{self, Cached, Lookup},
    config::Config,
    errors::{BindingErrorKind, InstantiateErrorKind, ResolveErrorKind, SeedErrorKind},
    fallback::{FallbackContext, ScopedWork, Seeds},
    interceptor::{Interceptor, ScopeInterceptor, ServiceInvokerInterceptor},
    invoker::Invoker,
    key::ScopeKey,
    provider::{Provided, Provider},
};

/// Per-request lifetime scope.
///
/// Values are cached on the request bound to the current thread,
/// or on the fallback context entered with [`RequestScope::scope_request`].
#[derive(Clone)]
pub struct RequestScope {
    inner: Arc<RequestScopeInner>,
}

struct RequestScopeInner {
    accessor: Arc<dyn ContextAccessor>,
    config: Config,
}

impl Default for RequestScope {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestScope {
    /// Name the scope is registered under in bindings.
    pub const NAME: &'static str = "RequestScope";
    /// Scope annotation that marks request-scoped bindings.
    pub const ANNOTATION: &'static str = "Request";

    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    #[inline]
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self::with_accessor(Arc::new(ThreadLocalAccessor), config)
    }

    #[inline]
    #[must_use]
    pub fn with_accessor(accessor: Arc<dyn ContextAccessor>, config: Config) -> Self {
        Self {
            inner: Arc::new(RequestScopeInner { accessor, config }),
        }
    }

    #[inline]
    #[must_use]
    pub fn accessor(&self) -> &Arc<dyn ContextAccessor> {
        &self.inner.accessor
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the value scoped to the current request, creating it at most once per request.
    ///
    /// # Notes
    /// Intrinsic keys (see [`Config::intrinsic_keys`]) are never cached while a request context is bound.
    /// Circular proxies are returned but never cached.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::OutOfScope`] if neither a request context nor a fallback context is bound
    /// - Returns [`ResolveErrorKind::IncorrectType`] if a value of another type is cached under `key`
    /// - Returns [`ResolveErrorKind::Instantiate`] if the creator fails
    pub fn resolve<T, F, E>(&self, key: ScopeKey, creator: F) -> Result<Option<Arc<T>>, ResolveErrorKind>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<Provided<T>, E>,
        E: Into<InstantiateErrorKind>,
    {
        let span = info_span!("resolve", %key);
        let _guard = span.enter();

        if let Some(context) = self.inner.accessor.request() {
            if self.inner.config.is_intrinsic(&key) {
                debug!("Intrinsic key, not cached");
                return create(creator).map(Provided::into_option);
            }

            // Filters may share the request, so the whole check-create-store runs under its lock
            let request = context.original_request();
            let guard = request.lock();
            match cache::lookup::<T>(&guard.borrow(), &key) {
                Lookup::Hit(value) => {
                    debug!("Found in request attributes");
                    return Ok(value);
                }
                Lookup::IncorrectType => return Err(incorrect_type::<T>(key)),
                Lookup::Missing => {}
            }
            debug!("Not found in request attributes");

            let provided = create(creator)?;
            if let Some(cached) = to_cached(&provided) {
                guard.borrow_mut().insert(key, cached);
                debug!("Cached in request attributes");
            }
            return Ok(provided.into_option());
        }

        if let Some(context) = self.inner.accessor.fallback() {
            return resolve_fallback(&context, key, creator);
        }

        let err = ResolveErrorKind::OutOfScope { key };
        error!("{}", err);
        Err(err)
    }

    /// Creates a provider that resolves `key` in this scope.
    #[must_use]
    pub fn scope<T, F, E>(&self, key: ScopeKey, creator: F) -> ScopedProvider<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Result<Provided<T>, E> + Send + Sync + 'static,
        E: Into<InstantiateErrorKind>,
    {
        ScopedProvider {
            key,
            creator: Arc::new(move || creator().map_err(Into::<InstantiateErrorKind>::into)),
            creator_name: type_name::<F>(),
            scope: self.clone(),
        }
    }

    /// Wraps `work` so it runs in a synthetic request scope seeded with `seeds`.
    ///
    /// Seeds are validated here, before `work` can run.
    ///
    /// # Errors
    /// Returns [`SeedErrorKind::IncompatibleValue`] if a seed value isn't an instance of its key type
    pub fn scope_request<W, R>(&self, work: W, seeds: Seeds) -> Result<ScopedWork<W>, SeedErrorKind>
    where
        W: FnOnce() -> R,
    {
        let map = seeds.validate()?;
        debug!(seeds = map.len(), "Request scope prepared");

        Ok(ScopedWork {
            work,
            context: Arc::new(FallbackContext::new(map)),
            accessor: self.inner.accessor.clone(),
        })
    }

    /// Checks whether `binding` is scoped with this scope.
    ///
    /// # Errors
    /// See [`crate::is_request_scoped`]
    #[inline]
    pub fn is_request_scoped<B: Bindings + ?Sized>(&self, binding: &Binding, bindings: &B) -> Result<bool, BindingErrorKind> {
        crate::binding::is_request_scoped(binding, bindings)
    }

    /// Creates an interceptor that binds the request context around `delegate`.
    #[inline]
    #[must_use]
    pub fn interceptor(&self, delegate: Arc<dyn Interceptor>) -> ScopeInterceptor {
        ScopeInterceptor::new(self.inner.accessor.clone(), delegate)
    }

    /// Creates an interceptor that binds the request context around a [`ServiceInvokerInterceptor`].
    #[inline]
    #[must_use]
    pub fn invoker_interceptor(&self, invoker: Arc<dyn Invoker>) -> ScopeInterceptor {
        self.interceptor(Arc::new(ServiceInvokerInterceptor::new(invoker)))
    }
}

impl Display for RequestScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(Self::NAME)
    }
}

impl Debug for RequestScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope").field("config", &self.inner.config).finish_non_exhaustive()
    }
}

// The fallback map is private to the owning thread, so it is only locked for map access
// and not while the creator runs
fn resolve_fallback<T, F, E>(context: &FallbackContext, key: ScopeKey, creator: F) -> Result<Option<Arc<T>>, ResolveErrorKind>
where
    T: Send + Sync + 'static,
    F: FnOnce() -> Result<Provided<T>, E>,
    E: Into<InstantiateErrorKind>,
{
    match cache::lookup::<T>(&context.map.lock(), &key) {
        Lookup::Hit(value) => {
            debug!("Found in fallback context");
            return Ok(value);
        }
        Lookup::IncorrectType => return Err(incorrect_type::<T>(key)),
        Lookup::Missing => {}
    }
    debug!("Not found in fallback context");

    let provided = create(creator)?;
    if let Some(cached) = to_cached(&provided) {
        context.map.lock().insert(key, cached);
        debug!("Cached in fallback context");
    }
    Ok(provided.into_option())
}

fn create<T, F, E>(creator: F) -> Result<Provided<T>, ResolveErrorKind>
where
    F: FnOnce() -> Result<Provided<T>, E>,
    E: Into<InstantiateErrorKind>,
{
    creator().map_err(|err| {
        let err = ResolveErrorKind::Instantiate(err.into());
        error!("{}", err);
        err
    })
}

fn to_cached<T: Send + Sync + 'static>(provided: &Provided<T>) -> Option<Cached> {
    match provided {
        Provided::Instance(value) => Some(Cached::Value(value.clone() as RcAny)),
        Provided::Null => Some(Cached::Null),
        Provided::CircularProxy(_) => {
            debug!("Circular proxy, not cached");
            None
        }
    }
}

fn incorrect_type<T: 'static>(key: ScopeKey) -> ResolveErrorKind {
    let err = ResolveErrorKind::IncorrectType {
        key,
        expected: TypeInfo::of::<T>(),
    };
    error!("{}", err);
    err
}

/// Provider of a request-scoped value, handed to the host binding system.
pub struct ScopedProvider<T> {
    key: ScopeKey,
    #[allow(clippy::type_complexity)]
    creator: Arc<dyn Fn() -> Result<Provided<T>, InstantiateErrorKind> + Send + Sync>,
    creator_name: &'static str,
    scope: RequestScope,
}

impl<T> ScopedProvider<T> {
    #[inline]
    #[must_use]
    pub fn key(&self) -> ScopeKey {
        self.key
    }
}

impl<T: Send + Sync + 'static> ScopedProvider<T> {
    /// Same as [`Provider::get`], callable without importing the trait.
    ///
    /// # Errors
    /// See [`RequestScope::resolve`]
    #[inline]
    pub fn get(&self) -> Result<Option<Arc<T>>, ResolveErrorKind> {
        self.scope.resolve(self.key, || (self.creator)())
    }
}

impl<T: Send + Sync + 'static> Provider<T> for ScopedProvider<T> {
    #[inline]
    fn get(&self) -> Result<Option<Arc<T>>, ResolveErrorKind> {
        ScopedProvider::get(self)
    }
}

impl<T> Clone for ScopedProvider<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            creator: self.creator.clone(),
            creator_name: self.creator_name,
            scope: self.scope.clone(),
        }
    }
}

impl<T> Display for ScopedProvider<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.creator_name, self.scope)
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};
    use std::{
        sync::{Arc, Barrier},
        thread,
    };
    use tracing_test::traced_test;

    use super::RequestScope;
    use crate::{
        config::Config,
        context::RequestContext,
        errors::{InstantiateErrorKind, ResolveErrorKind},
        fallback::Seeds,
        key::ScopeKey,
        message::Message,
        provider::Provided,
    };

    struct User(&'static str);
    struct Session(Arc<User>);

    fn context(message: &Arc<Message>) -> Arc<RequestContext> {
        Arc::new(RequestContext::new(message.clone(), message.clone()))
    }

    fn in_request<R>(scope: &RequestScope, message: &Arc<Message>, work: impl FnOnce() -> R) -> R {
        context(message).call(&**scope.accessor(), work).unwrap()
    }

    #[test]
    #[traced_test]
    fn test_memoized_within_request() {
        let scope = RequestScope::new();
        let message = Arc::new(Message::new());
        let calls = AtomicUsize::new(0);
        let creator = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, InstantiateErrorKind>(Provided::new(User("admin")))
        };

        in_request(&scope, &message, || {
            let first = scope.resolve(ScopeKey::of::<User>(), creator).unwrap().unwrap();
            let second = scope.resolve(ScopeKey::of::<User>(), creator).unwrap().unwrap();

            assert!(Arc::ptr_eq(&first, &second));
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(message.get::<User>(&ScopeKey::of::<User>()).unwrap().0, "admin");
    }

    #[test]
    #[traced_test]
    fn test_isolated_across_requests() {
        let scope = RequestScope::new();
        let first_message = Arc::new(Message::new());
        let second_message = Arc::new(Message::new());

        let first = in_request(&scope, &first_message, || {
            scope
                .resolve(ScopeKey::of::<User>(), || Ok::<_, InstantiateErrorKind>(Provided::new(User("first"))))
                .unwrap()
                .unwrap()
        });
        let second = in_request(&scope, &second_message, || {
            scope
                .resolve(ScopeKey::of::<User>(), || Ok::<_, InstantiateErrorKind>(Provided::new(User("second"))))
                .unwrap()
                .unwrap()
        });

        assert_eq!(first.0, "first");
        assert_eq!(second.0, "second");
    }

    #[test]
    #[traced_test]
    fn test_null_is_cached() {
        let scope = RequestScope::new();
        let message = Arc::new(Message::new());
        let calls = AtomicUsize::new(0);

        in_request(&scope, &message, || {
            for _ in 0..3 {
                let value = scope
                    .resolve(ScopeKey::of::<User>(), || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, InstantiateErrorKind>(Provided::<User>::Null)
                    })
                    .unwrap();
                assert!(value.is_none());
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(message.contains(&ScopeKey::of::<User>()));
    }

    #[test]
    #[traced_test]
    fn test_out_of_scope() {
        let scope = RequestScope::new();

        for _ in 0..2 {
            let result = scope.resolve(ScopeKey::of::<User>(), || Ok::<_, InstantiateErrorKind>(Provided::new(User("admin"))));
            assert!(matches!(result, Err(ResolveErrorKind::OutOfScope { .. })));
        }
    }

    #[test]
    #[traced_test]
    fn test_intrinsic_keys_not_cached() {
        let scope = RequestScope::with_config(Config::default().with_intrinsic_key(ScopeKey::of::<User>()));
        let message = Arc::new(Message::new());
        let calls = AtomicUsize::new(0);

        in_request(&scope, &message, || {
            for _ in 0..3 {
                scope
                    .resolve(ScopeKey::of::<User>(), || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, InstantiateErrorKind>(Provided::new(User("admin")))
                    })
                    .unwrap();
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!message.contains(&ScopeKey::of::<User>()));
    }

    #[test]
    #[traced_test]
    fn test_circular_proxy_not_cached() {
        let scope = RequestScope::new();
        let message = Arc::new(Message::new());
        let calls = AtomicUsize::new(0);

        in_request(&scope, &message, || {
            let proxy = scope
                .resolve(ScopeKey::of::<User>(), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, InstantiateErrorKind>(Provided::CircularProxy(Arc::new(User("proxy"))))
                })
                .unwrap()
                .unwrap();
            assert_eq!(proxy.0, "proxy");

            let real = scope
                .resolve(ScopeKey::of::<User>(), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, InstantiateErrorKind>(Provided::new(User("real")))
                })
                .unwrap()
                .unwrap();
            assert_eq!(real.0, "real");
        });

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    #[traced_test]
    fn test_creator_failure_not_cached() {
        let scope = RequestScope::new();
        let message = Arc::new(Message::new());

        in_request(&scope, &message, || {
            let result = scope.resolve(ScopeKey::of::<User>(), || {
                Err::<Provided<User>, _>(InstantiateErrorKind::Custom(anyhow::anyhow!("database unavailable")))
            });
            assert!(matches!(result, Err(ResolveErrorKind::Instantiate(_))));
        });

        assert!(!message.contains(&ScopeKey::of::<User>()));
    }

    #[test]
    #[traced_test]
    fn test_incorrect_cached_type() {
        let scope = RequestScope::new();
        let message = Arc::new(Message::new());
        message.put(ScopeKey::of::<User>(), 5u8);

        in_request(&scope, &message, || {
            let result = scope.resolve(ScopeKey::of::<User>(), || Ok::<_, InstantiateErrorKind>(Provided::new(User("admin"))));
            assert!(matches!(result, Err(ResolveErrorKind::IncorrectType { .. })));
        });
    }

    #[test]
    #[traced_test]
    fn test_nested_resolve_in_creator() {
        let scope = RequestScope::new();
        let message = Arc::new(Message::new());
        let user = scope.scope(ScopeKey::of::<User>(), || Ok::<_, InstantiateErrorKind>(Provided::new(User("admin"))));
        let session = {
            let user = user.clone();
            scope.scope(ScopeKey::of::<Session>(), move || {
                let user = user.get().map_err(anyhow::Error::from)?;
                Ok::<_, anyhow::Error>(Provided::from_option(user.map(Session)))
            })
        };

        in_request(&scope, &message, || {
            let session = session.get().unwrap().unwrap();
            let user = user.get().unwrap().unwrap();

            assert!(Arc::ptr_eq(&session.0, &user));
        });
    }

    #[test]
    #[traced_test]
    fn test_inherited_context_uses_original_request() {
        let scope = RequestScope::new();
        let original = Arc::new(Message::new());
        let sub_request = Arc::new(Message::new());
        let sub_context = Arc::new(RequestContext::new(original.clone(), sub_request.clone()));

        sub_context
            .call(&**scope.accessor(), || {
                scope
                    .resolve(ScopeKey::of::<User>(), || Ok::<_, InstantiateErrorKind>(Provided::new(User("admin"))))
                    .unwrap();
            })
            .unwrap();

        assert!(original.contains(&ScopeKey::of::<User>()));
        assert!(!sub_request.contains(&ScopeKey::of::<User>()));
    }

    #[test]
    #[traced_test]
    fn test_single_winner_across_threads() {
        const THREADS: usize = 8;

        let scope = RequestScope::new();
        let message = Arc::new(Message::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles = (0..THREADS)
            .map(|_| {
                let scope = scope.clone();
                let message = message.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    // Each thread gets its own context over the shared request
                    in_request(&scope, &message, || {
                        barrier.wait();
                        scope
                            .resolve(ScopeKey::of::<User>(), || {
                                calls.fetch_add(1, Ordering::SeqCst);
                                Ok::<_, InstantiateErrorKind>(Provided::new(User("admin")))
                            })
                            .unwrap()
                            .unwrap()
                    })
                })
            })
            .collect::<Vec<_>>();

        let users = handles.into_iter().map(|handle| handle.join().unwrap()).collect::<Vec<_>>();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(users.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    }

    #[test]
    #[traced_test]
    fn test_resolve_in_fallback_scope() {
        let scope = RequestScope::new();
        let calls = AtomicUsize::new(0);
        let work = scope
            .scope_request(
                || {
                    let seeded = scope
                        .resolve(ScopeKey::of::<User>(), || Ok::<_, InstantiateErrorKind>(Provided::new(User("created"))))
                        .unwrap()
                        .unwrap();
                    let null = scope
                        .resolve(ScopeKey::of::<u32>(), || Ok::<_, InstantiateErrorKind>(Provided::new(1u32)))
                        .unwrap();
                    for _ in 0..2 {
                        scope
                            .resolve(ScopeKey::of::<u8>(), || {
                                calls.fetch_add(1, Ordering::SeqCst);
                                Ok::<_, InstantiateErrorKind>(Provided::new(1u8))
                            })
                            .unwrap();
                    }
                    (seeded.0, null)
                },
                Seeds::new().insert(User("seeded")).insert_null(ScopeKey::of::<u32>()),
            )
            .unwrap();

        let (seeded, null) = work.call().unwrap();

        assert_eq!(seeded, "seeded");
        assert!(null.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            scope.resolve(ScopeKey::of::<User>(), || Ok::<_, InstantiateErrorKind>(Provided::new(User("created")))),
            Err(ResolveErrorKind::OutOfScope { .. })
        ));
    }

    #[test]
    fn test_provider_display() {
        let scope = RequestScope::new();
        let provider = scope.scope(ScopeKey::of::<User>(), || Ok::<_, InstantiateErrorKind>(Provided::new(User("admin"))));

        assert!(provider.to_string().ends_with("[RequestScope]"));
        assert_eq!(provider.key(), ScopeKey::of::<User>());
    }
}
