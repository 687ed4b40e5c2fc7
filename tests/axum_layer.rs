use axum::{
    body::{to_bytes, Body},
    extract::{Extension, State},
    http::{Request, StatusCode},
    routing::get,
    Router,
};
use reqscope::{integrations::axum::RequestScopeLayer, InstantiateErrorKind, Message, Provided, RequestScope, ScopeKey};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};
use tower_service::Service as _;

struct RequestId(u32);

#[derive(Clone)]
struct AppState {
    scope: RequestScope,
    created: Arc<AtomicU32>,
}

impl AppState {
    fn request_id(&self) -> Arc<RequestId> {
        let created = self.created.clone();
        self.scope
            .resolve(ScopeKey::of::<RequestId>(), move || {
                Ok::<_, InstantiateErrorKind>(Provided::new(RequestId(created.fetch_add(1, Ordering::SeqCst))))
            })
            .unwrap()
            .unwrap()
    }
}

async fn handler(State(state): State<AppState>, Extension(message): Extension<Arc<Message>>) -> String {
    let first = state.request_id();
    tokio::task::yield_now().await;
    let second = state.request_id();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(message.contains(&ScopeKey::of::<RequestId>()));
    first.0.to_string()
}

fn router(state: AppState) -> Router {
    let layer = RequestScopeLayer::new(state.scope.clone());
    Router::new().route("/", get(handler)).with_state(state).layer(layer)
}

async fn send(router: &mut Router) -> (StatusCode, String) {
    let response = router
        .call(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_value_per_request() {
    let state = AppState {
        scope: RequestScope::new(),
        created: Arc::new(AtomicU32::new(0)),
    };
    let mut router = router(state.clone());

    assert_eq!(send(&mut router).await, (StatusCode::OK, "0".to_owned()));
    assert_eq!(send(&mut router).await, (StatusCode::OK, "1".to_owned()));
    assert_eq!(state.created.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_requests() {
    let state = AppState {
        scope: RequestScope::new(),
        created: Arc::new(AtomicU32::new(0)),
    };
    let router = router(state.clone());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let mut router = router.clone();
        handles.push(tokio::spawn(async move { send(&mut router).await }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        ids.push(body.parse::<u32>().unwrap());
    }
    ids.sort_unstable();

    assert_eq!(ids, (0..8).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_out_of_scope_outside_layer() {
    let scope = RequestScope::new();

    let result = scope.resolve(ScopeKey::of::<RequestId>(), || {
        Ok::<_, InstantiateErrorKind>(Provided::new(RequestId(0)))
    });

    assert!(matches!(result, Err(reqscope::ResolveErrorKind::OutOfScope { .. })));
}
