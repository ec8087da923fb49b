//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::CACHE_CONTROL, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use http_dispatch::transport::ReqwestTransport;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;

/// A local upstream counting the calls it receives.
#[allow(dead_code)]
pub struct Upstream {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl Upstream {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Start an upstream on an ephemeral port.
///
/// - `/cached` answers `{"n": <hit count>}` with `cache-control: max-age=60`
/// - `/status/{code}` answers `{"code": code}` with that status
/// - anything else echoes the call back as JSON
pub async fn start_upstream() -> Upstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/cached", get(cached))
        .route("/status/{code}", any(status))
        .fallback(echo)
        .with_state(hits.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Upstream { addr, hits }
}

/// Transport that never goes through an environment proxy.
#[allow(dead_code)]
pub fn direct_transport() -> Arc<ReqwestTransport> {
    Arc::new(ReqwestTransport::new(
        reqwest::Client::builder().no_proxy().build().unwrap(),
    ))
}

#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

async fn echo(
    State(hits): State<Arc<AtomicUsize>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    hits.fetch_add(1, Ordering::SeqCst);
    let headers: Map<String, Value> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                Value::String(value.to_str().unwrap_or_default().to_string()),
            )
        })
        .collect();

    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query().unwrap_or_default(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn cached(State(hits): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    let n = hits.fetch_add(1, Ordering::SeqCst) + 1;
    ([(CACHE_CONTROL, "max-age=60")], Json(json!({ "n": n })))
}

async fn status(State(hits): State<Arc<AtomicUsize>>, Path(code): Path<u16>) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "code": code }))).into_response()
}
