//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the dispatch handler
//! - Wire up middleware (tracing, limits, timeout)
//! - Build actions and connections from configuration
//! - Swap the action table atomically on config reload
//! - Convert inbound calls, invoke the matched action and render its response

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request, StatusCode},
    response::Response,
    Router,
};
use http::Method;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::schema::EngineConfig;
use crate::connection::{ConnectionFactory, ConnectionRegistry};
use crate::dispatch::context::CallContext;
use crate::dispatch::error::{DispatchError, DispatchResult};
use crate::dispatch::sender::Sender;
use crate::http::request::{inbound_request, X_REQUEST_ID};
use crate::http::response::{error_response, message_response, render};
use crate::observability::metrics;
use crate::routing::{Route, RouteMiss, RoutePattern, Router as ActionRouter};
use crate::strategy::{build_action, Action};
use crate::transport::{MemoryCacheStore, ReqwestTransport};

/// A configured action bound to its route.
pub struct ActionHandle {
    pub name: String,
    pub operation_id: String,
    pub action: Arc<dyn Action>,
}

/// Compile the action table for `config`.
pub fn build_routes(config: &EngineConfig, sender: &Sender) -> DispatchResult<ActionRouter<Arc<ActionHandle>>> {
    let connections = ConnectionRegistry::from_settings(&config.connections, &ConnectionFactory)?;

    let mut routes = Vec::with_capacity(config.actions.len());
    for action_config in &config.actions {
        let pattern = RoutePattern::parse(&action_config.path)
            .map_err(|e| DispatchError::configuration(e.to_string()))?;
        let methods = action_config
            .methods
            .iter()
            .map(|m| {
                m.to_ascii_uppercase()
                    .parse::<Method>()
                    .map_err(|_| DispatchError::configuration(format!("Invalid method '{}'", m)))
            })
            .collect::<DispatchResult<Vec<_>>>()?;

        let action = build_action(action_config, sender, &connections)?;
        routes.push(Route {
            pattern,
            methods,
            priority: action_config.priority,
            target: Arc::new(ActionHandle {
                name: action_config.name.clone(),
                operation_id: action_config.operation_id().to_string(),
                action,
            }),
        });
    }

    Ok(ActionRouter::new(routes))
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<ArcSwap<ActionRouter<Arc<ActionHandle>>>>,
    pub max_body_bytes: usize,
}

/// HTTP host serving configured actions.
pub struct HttpServer {
    state: AppState,
    config: EngineConfig,
    sender: Sender,
}

impl HttpServer {
    /// Create a server dispatching through reqwest with an in-memory cache.
    pub fn new(config: EngineConfig) -> DispatchResult<Self> {
        let sender = Sender::new(Arc::new(ReqwestTransport::default()))
            .with_cache_store(Arc::new(MemoryCacheStore::new(config.cache.max_entries)));
        Self::with_sender(config, sender)
    }

    /// Create a server dispatching through `sender`.
    pub fn with_sender(config: EngineConfig, sender: Sender) -> DispatchResult<Self> {
        let routes = build_routes(&config, &sender)?;
        tracing::info!(actions = routes.len(), "Action routes compiled");

        let state = AppState {
            routes: Arc::new(ArcSwap::from_pointee(routes)),
            max_body_bytes: config.listener.max_body_bytes,
        };
        Ok(Self {
            state,
            config,
            sender,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(dispatch_handler)
            .with_state(self.state.clone())
            .layer(RequestBodyLimitLayer::new(self.config.listener.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.listener.request_timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires, applying configs received on `config_updates`.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<EngineConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let routes = self.state.routes.clone();
        let sender = self.sender.clone();
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                match build_routes(&new_config, &sender) {
                    Ok(new_routes) => {
                        tracing::info!(actions = new_routes.len(), "Configuration reloaded");
                        routes.store(Arc::new(new_routes));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Rejected reloaded configuration, keeping current routes");
                    }
                }
            }
        });

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown requested, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Match the action, convert the call, dispatch and render.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let lookup = {
        let routes = state.routes.load();
        routes
            .lookup(&method, &path)
            .map(|matched| (matched.target.clone(), matched.params))
    };
    let (handle, params) = match lookup {
        Ok(found) => found,
        Err(miss) => {
            tracing::warn!(request_id = %request_id, method = %method, path = %path, "No action matched");
            let status = match miss {
                RouteMiss::NotFound => StatusCode::NOT_FOUND,
                RouteMiss::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            };
            return with_request_id(message_response(status, "No action matched the request"), &request_id);
        }
    };

    tracing::debug!(
        request_id = %request_id,
        action = %handle.name,
        method = %method,
        path = %path,
        "Dispatching action"
    );

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to read request body");
            let response = message_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
            metrics::record_request(&handle.name, handle.action.name(), response.status().as_u16(), start);
            return with_request_id(response, &request_id);
        }
    };

    let mut context = CallContext::anonymous(handle.operation_id.clone());
    if let Some(ip) = client_ip {
        context = context.with_client_ip(ip);
    }

    let result = match inbound_request(&parts, params, body) {
        Ok(inbound) => handle.action.handle(&inbound, &context).await,
        Err(e) => Err(e),
    };

    let response = match result {
        Ok(normalized) => render(normalized),
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                action = %handle.name,
                kind = e.kind(),
                error = %e,
                "Action failed"
            );
            error_response(&e)
        }
    };

    metrics::record_request(&handle.name, handle.action.name(), response.status().as_u16(), start);
    with_request_id(response, &request_id)
}

fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ActionConfig, ProxyOptions, StrategyConfig};
    use crate::transport::mock::RecordingTransport;
    use tower::ServiceExt;

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.actions.push(ActionConfig {
            name: "get-user".into(),
            path: "/users/:id".into(),
            methods: vec!["GET".into()],
            priority: 0,
            operation_id: Some("op-user".into()),
            connection: None,
            strategy: StrategyConfig::Processor {
                url: "http://upstream.test/users/:id".into(),
                options: ProxyOptions::default(),
            },
        });
        config
    }

    #[tokio::test]
    async fn test_dispatches_matched_action() {
        let transport = Arc::new(RecordingTransport::new(vec![RecordingTransport::json(200, r#"{"id":"5"}"#)]));
        let server = HttpServer::with_sender(config(), Sender::new(transport.clone())).unwrap();

        let response = server
            .router()
            .oneshot(Request::builder().uri("/users/5?x=1").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"id":"5"}"#);

        let sent = transport.requests();
        assert_eq!(sent[0].url.as_str(), "http://upstream.test/users/5?x=1");
        assert_eq!(sent[0].headers.get("x-fusio-operation-id").unwrap(), "op-user");
    }

    #[tokio::test]
    async fn test_route_misses() {
        let server = HttpServer::with_sender(config(), Sender::new(Arc::new(RecordingTransport::default()))).unwrap();

        let not_found = server
            .router()
            .oneshot(Request::builder().uri("/nothing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let wrong_method = server
            .router()
            .oneshot(Request::builder().method("DELETE").uri("/users/1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(wrong_method.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_invalid_json_body_is_bad_request() {
        let transport = Arc::new(RecordingTransport::default());
        let mut config = config();
        config.actions[0].methods.clear();
        let server = HttpServer::with_sender(config, Sender::new(transport.clone())).unwrap();

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/users/1")
                    .header("content-type", "application/json")
                    .body(Body::from("{broken"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(transport.call_count(), 0);
    }
}
