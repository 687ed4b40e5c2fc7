use core::fmt::{self, Debug, Formatter};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info_span};

use crate::{
    accessor::ContextAccessor,
    context::RequestContext,
    errors::Fault,
    invoker::Invoker,
    message::Message,
};

/// Phases of message processing, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Phase {
    Receive,
    PreLogical,
    Unmarshal,
    PreInvoke,
    Invoke,
    PostInvoke,
    Marshal,
    Send,
}

/// Step of the processing chain.
pub trait Interceptor: Send + Sync {
    #[must_use]
    fn id(&self) -> &'static str;

    #[must_use]
    fn phase(&self) -> Phase;

    /// Ids of steps in the same phase this one must run before.
    #[must_use]
    fn before(&self) -> &'static [&'static str] {
        &[]
    }

    /// # Errors
    /// Returns a fault to abort processing of the message
    fn handle_message(&self, message: &Arc<Message>) -> Result<(), Fault>;
}

/// Ordered sequence of steps a message passes through.
///
/// Steps may be removed while the chain is running; the running cursor honours removals.
#[derive(Default)]
pub struct InterceptorChain {
    state: Mutex<ChainState>,
}

#[derive(Default)]
struct ChainState {
    interceptors: Vec<Arc<dyn Interceptor>>,
    position: usize,
}

impl InterceptorChain {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the step after every step of an earlier or the same phase,
    /// unless it declares it must run before one of them.
    pub fn add(&self, interceptor: Arc<dyn Interceptor>) {
        let mut state = self.state.lock();
        let phase = interceptor.phase();
        let before = interceptor.before();
        let index = state
            .interceptors
            .iter()
            .position(|other| other.phase() > phase || (other.phase() == phase && before.contains(&other.id())))
            .unwrap_or(state.interceptors.len());
        if index < state.position {
            state.position += 1;
        }
        state.interceptors.insert(index, interceptor);
    }

    /// Snapshot of the steps in execution order.
    #[must_use]
    pub fn iter(&self) -> Vec<Arc<dyn Interceptor>> {
        self.state.lock().interceptors.clone()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&'static str> {
        self.state.lock().interceptors.iter().map(|interceptor| interceptor.id()).collect()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().interceptors.iter().any(|interceptor| interceptor.id() == id)
    }

    /// Removes every step with `id`, returns how many were removed.
    pub fn remove(&self, id: &str) -> usize {
        let mut state = self.state.lock();
        let ChainState { interceptors, position } = &mut *state;

        let mut removed = 0;
        let mut index = 0;
        while index < interceptors.len() {
            if interceptors[index].id() == id {
                interceptors.remove(index);
                if index < *position {
                    *position -= 1;
                }
                removed += 1;
            } else {
                index += 1;
            }
        }
        removed
    }

    /// Runs `message` through every step.
    ///
    /// # Errors
    /// Returns the fault of the first failing step; the remaining steps are skipped
    pub fn do_intercept(self: &Arc<Self>, message: &Arc<Message>) -> Result<(), Fault> {
        let span = info_span!("do_intercept", message = message.id());
        let _guard = span.enter();

        message.set_interceptor_chain(self.clone());
        self.state.lock().position = 0;

        loop {
            let next = {
                let mut state = self.state.lock();
                let Some(next) = state.interceptors.get(state.position).cloned() else {
                    break;
                };
                state.position += 1;
                next
            };

            debug!(interceptor = next.id(), "Handling message");
            if let Err(fault) = next.handle_message(message) {
                error!(interceptor = next.id(), %fault, "Processing aborted");
                return Err(fault);
            }
        }
        Ok(())
    }
}

impl Debug for InterceptorChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

/// Final step of the chain: invokes the service and stores its response on the message.
pub struct ServiceInvokerInterceptor {
    invoker: Arc<dyn Invoker>,
}

impl ServiceInvokerInterceptor {
    pub const ID: &'static str = "ServiceInvokerInterceptor";

    #[inline]
    #[must_use]
    pub fn new(invoker: Arc<dyn Invoker>) -> Self {
        Self { invoker }
    }

    #[inline]
    #[must_use]
    pub fn invoker(&self) -> &Arc<dyn Invoker> {
        &self.invoker
    }
}

impl Interceptor for ServiceInvokerInterceptor {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn phase(&self) -> Phase {
        Phase::Invoke
    }

    fn handle_message(&self, message: &Arc<Message>) -> Result<(), Fault> {
        let response = self.invoker.invoke(message).map_err(|err| {
            let fault = Fault::wrap(err);
            error!(invoker = self.invoker.type_info().name, %fault, "Invocation failed");
            fault
        })?;
        message.set_response(response);
        Ok(())
    }
}

/// Binds a [`RequestContext`] to the current thread while its delegate handles the message.
///
/// It takes the service invocation over from the chain, so the scope is active
/// for the final invocation step inclusive.
pub struct ScopeInterceptor {
    accessor: Arc<dyn ContextAccessor>,
    delegate: Arc<dyn Interceptor>,
}

impl ScopeInterceptor {
    pub const ID: &'static str = "ScopeInterceptor";

    #[inline]
    #[must_use]
    pub fn new(accessor: Arc<dyn ContextAccessor>, delegate: Arc<dyn Interceptor>) -> Self {
        Self { accessor, delegate }
    }
}

impl Interceptor for ScopeInterceptor {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn phase(&self) -> Phase {
        Phase::Invoke
    }

    fn before(&self) -> &'static [&'static str] {
        &[ServiceInvokerInterceptor::ID]
    }

    fn handle_message(&self, request: &Arc<Message>) -> Result<(), Fault> {
        let span = info_span!("scope_interceptor", request = request.id(), delegate = self.delegate.id());
        let _guard = span.enter();

        if let Some(chain) = request.interceptor_chain() {
            let removed = chain.remove(ServiceInvokerInterceptor::ID);
            if removed > 0 {
                debug!(removed, "Service invoker taken over from chain");
            }
        }

        // Sub-invocations keep caching on the outer request
        let original_request = match self.accessor.request() {
            Some(previous) => {
                debug!(original_request = previous.original_request().id(), "Inherited original request");
                previous.original_request().clone()
            }
            None => request.clone(),
        };
        let context = Arc::new(RequestContext::new(original_request, request.clone()));

        match context.call(&*self.accessor, || self.delegate.handle_message(request)) {
            Ok(result) => result,
            Err(err) => Err(Fault::wrap(err)),
        }
    }
}
