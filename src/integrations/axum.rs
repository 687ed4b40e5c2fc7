use axum::{
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use std::sync::Arc;
use tower_layer::Layer;
use tower_service::Service;
use tracing::{debug, error};

use crate::{accessor::ContextAccessor, context::RequestContext, errors::Fault, message::Message, scope::RequestScope};

impl IntoResponse for Fault {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// Binds a request context for every HTTP request passing through the wrapped service.
///
/// The [`Message`] of the request is inserted into the request extensions as `Arc<Message>`.
#[derive(Clone)]
pub struct RequestScopeLayer {
    scope: RequestScope,
}

impl RequestScopeLayer {
    #[inline]
    #[must_use]
    pub fn new(scope: RequestScope) -> Self {
        Self { scope }
    }
}

impl<S> Layer<S> for RequestScopeLayer {
    type Service = ScopedService<S>;

    fn layer(&self, service: S) -> Self::Service {
        ScopedService {
            service,
            scope: self.scope.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ScopedService<S> {
    service: S,
    scope: RequestScope,
}

impl<ReqBody, S> Service<Request<ReqBody>> for ScopedService<S>
where
    S: Service<Request<ReqBody>, Response = Response>,
{
    type Response = Response;
    type Error = S::Error;
    type Future = ScopedFuture<S::Future>;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let accessor = self.scope.accessor().clone();
        let message = Arc::new(Message::new());
        request.extensions_mut().insert(message.clone());

        let original_request = accessor
            .request()
            .map_or_else(|| message.clone(), |previous| previous.original_request().clone());
        let context = Arc::new(RequestContext::new(original_request, message));

        let service = &mut self.service;
        match context.call(&*accessor, move || service.call(request)) {
            Ok(future) => ScopedFuture {
                state: State::Pending {
                    future: Box::pin(future),
                    context,
                    accessor,
                },
            },
            Err(err) => ScopedFuture {
                state: State::Failed(Some(Fault::wrap(err))),
            },
        }
    }
}

/// Future that binds its request context on every poll.
///
/// Ownership of the context is released between polls, so the task may be resumed on another worker thread.
pub struct ScopedFuture<F> {
    state: State<F>,
}

enum State<F> {
    Pending {
        future: Pin<Box<F>>,
        context: Arc<RequestContext>,
        accessor: Arc<dyn ContextAccessor>,
    },
    Failed(Option<Fault>),
}

impl<F, E> Future for ScopedFuture<F>
where
    F: Future<Output = Result<Response, E>>,
{
    type Output = Result<Response, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            State::Pending {
                future,
                context,
                accessor,
            } => match context.call(&**accessor, || future.as_mut().poll(cx)) {
                Ok(poll) => {
                    if poll.is_ready() {
                        debug!(request = context.request().id(), "Request completed");
                    }
                    poll
                }
                Err(err) => {
                    let fault = Fault::wrap(err);
                    error!(%fault, "Request scope can't be resumed");
                    Poll::Ready(Ok(fault.into_response()))
                }
            },
            State::Failed(fault) => {
                let fault = fault.take().unwrap_or_else(|| Fault::new("Scoped future polled after completion"));
                error!(%fault, "Request scope can't be entered");
                Poll::Ready(Ok(fault.into_response()))
            }
        }
    }
}
