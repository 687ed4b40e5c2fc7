pub(crate) mod accessor;
pub(crate) mod any;
pub(crate) mod binding;
pub(crate) mod cache;
pub(crate) mod config;
pub(crate) mod context;
pub(crate) mod errors;
pub(crate) mod fallback;
pub(crate) mod interceptor;
pub(crate) mod invoker;
pub(crate) mod key;
pub(crate) mod message;
pub(crate) mod provider;
pub(crate) mod resource;
pub(crate) mod scope;

pub mod integrations;

pub use accessor::{ContextAccessor, ThreadLocalAccessor};
pub use any::TypeInfo;
pub use binding::{is_request_scoped, resolve_binding_target, Binding, BindingMap, BindingTarget, Bindings, Scoping};
pub use config::Config;
pub use context::RequestContext;
pub use errors::{
    BindingErrorKind, Fault, InstantiateErrorKind, InvokeErrorKind, ResolveErrorKind, SeedErrorKind, StateErrorKind,
};
pub use fallback::{FallbackContext, ScopedWork, Seeds};
pub use interceptor::{Interceptor, InterceptorChain, Phase, ScopeInterceptor, ServiceInvokerInterceptor};
pub use invoker::{is_default, DefaultInvoker, Invoker};
pub use key::ScopeKey;
pub use message::Message;
pub use provider::{Provided, Provider};
pub use resource::{PerRequestResourceProvider, ResourceProvider};
pub use scope::{RequestScope, ScopedProvider};
