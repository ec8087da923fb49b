//! The dispatcher: one outbound call from configuration plus request context.
//!
//! # Data Flow
//! ```text
//! RequestConfig + InboundRequest + CallContext
//!     → RequestExtractor (method, path params, query, headers, payload)
//!     → rewrite.rs (placeholders, url resolution, identity headers, query layering)
//!     → codec.rs (encode body)
//!     → [CachingTransport when caching is enabled]
//!     → HttpTransport
//!     → response.rs (normalize)
//! ```
//!
//! # Design Decisions
//! - Transport failures surface as `UpstreamUnavailable` and are never retried here
//! - 4xx/5xx upstream statuses come back as ordinary responses
//! - A named connection supplies the transport, base URL, default version and cache opt-in

use std::sync::Arc;
use std::time::Instant;

use http::{HeaderMap, Method};
use indexmap::IndexMap;

use crate::connection::Connection;
use crate::dispatch::codec::encode_payload;
use crate::dispatch::context::{CallContext, InboundRequest};
use crate::dispatch::error::{DispatchError, DispatchResult};
use crate::dispatch::payload::Payload;
use crate::dispatch::request_config::{QueryParams, RequestConfig};
use crate::dispatch::response::{normalize, NormalizedResponse};
use crate::dispatch::rewrite::{apply_query, inject_identity_headers, resolve_url, substitute_placeholders};
use crate::observability::metrics;
use crate::transport::{
    CacheStore, CachingTransport, Clock, HttpTransport, MemoryCacheStore, OutboundRequest,
    ReqwestTransport, SystemClock,
};

/// Request values a strategy hands to the dispatcher.
#[derive(Debug, Clone)]
pub struct RequestValues {
    pub method: Method,
    pub path_params: IndexMap<String, String>,
    pub query: QueryParams,
    pub headers: HeaderMap,
    pub payload: Option<Payload>,
}

impl RequestValues {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            path_params: IndexMap::new(),
            query: QueryParams::new(),
            headers: HeaderMap::new(),
            payload: None,
        }
    }
}

/// How a strategy derives its request values.
pub trait RequestExtractor: Send + Sync {
    fn extract(
        &self,
        config: &RequestConfig,
        request: &InboundRequest,
        context: &CallContext,
    ) -> DispatchResult<RequestValues>;
}

/// Shared dispatcher used by every strategy.
#[derive(Clone)]
pub struct Sender {
    transport: Arc<dyn HttpTransport>,
    cache_store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl Sender {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            cache_store: Arc::new(MemoryCacheStore::default()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Back cached calls with a host supplied store.
    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = store;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Assemble, send and normalize one outbound call.
    pub async fn send(
        &self,
        config: &RequestConfig,
        request: &InboundRequest,
        context: &CallContext,
        extractor: &dyn RequestExtractor,
        connection: Option<&Connection>,
    ) -> DispatchResult<NormalizedResponse> {
        let values = extractor.extract(config, request, context)?;
        let RequestValues {
            method,
            path_params,
            query,
            mut headers,
            payload,
        } = values;

        let raw_url = substitute_placeholders(config.url(), &path_params);
        let mut url = resolve_url(&raw_url, connection.and_then(|c| c.base_url.as_ref()))?;
        apply_query(&mut url, &query, config.query());

        inject_identity_headers(&mut headers, context)?;
        let body = encode_payload(config.effective_content_type(), payload.as_ref(), &mut headers).await?;

        let outbound = OutboundRequest {
            method,
            url,
            headers,
            body,
            version: config.version().or(connection.and_then(|c| c.version)),
        };

        let cached = config.should_cache() || connection.is_some_and(|c| c.cache);
        let transport = self.transport_for(connection, cached);

        tracing::debug!(
            operation_id = %context.operation_id,
            method = %outbound.method,
            url = %outbound.url,
            cached = cached,
            "Dispatching upstream request"
        );

        let start = Instant::now();
        let url = outbound.url.to_string();
        let host = outbound.url.host_str().unwrap_or_default().to_string();
        let response = transport.execute(outbound).await.map_err(|e| {
            tracing::warn!(url = %url, kind = ?e.kind, error = %e.message, "Upstream call failed");
            metrics::record_upstream_error(&host);
            DispatchError::UpstreamUnavailable {
                url: url.clone(),
                message: e.message,
            }
        })?;

        tracing::debug!(
            url = %url,
            status = %response.status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Upstream responded"
        );

        Ok(normalize(response))
    }

    fn transport_for(&self, connection: Option<&Connection>, cached: bool) -> Arc<dyn HttpTransport> {
        let base = connection
            .map(|c| c.transport.clone())
            .unwrap_or_else(|| self.transport.clone());
        if cached {
            Arc::new(CachingTransport::with_clock(
                base,
                self.cache_store.clone(),
                self.clock.clone(),
            ))
        } else {
            base
        }
    }
}

impl Default for Sender {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestTransport::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::response::ResponseBody;
    use crate::transport::mock::RecordingTransport;
    use crate::transport::{OutboundBody, TransportErrorKind};
    use serde_json::json;
    use url::Url;

    struct FixedExtractor(RequestValues);

    impl RequestExtractor for FixedExtractor {
        fn extract(&self, _: &RequestConfig, _: &InboundRequest, _: &CallContext) -> DispatchResult<RequestValues> {
            Ok(self.0.clone())
        }
    }

    fn values(method: Method) -> RequestValues {
        let mut values = RequestValues::new(method);
        values.path_params.insert("id".into(), "42".into());
        values.query.insert("page", "1");
        values
    }

    #[tokio::test]
    async fn test_send_assembles_request() {
        let transport = Arc::new(RecordingTransport::new(vec![RecordingTransport::json(200, r#"{"a":1}"#)]));
        let sender = Sender::new(transport.clone());
        let config = RequestConfig::new("http://upstream.test/items/:id?page=0&sort=asc")
            .unwrap()
            .with_query(QueryParams::parse("sort=desc").unwrap());

        let response = sender
            .send(
                &config,
                &InboundRequest::default(),
                &CallContext::anonymous("op-1"),
                &FixedExtractor(values(Method::GET)),
                None,
            )
            .await
            .unwrap();

        assert_eq!(response.body, ResponseBody::Json(json!({"a": 1})));
        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url.as_str(), "http://upstream.test/items/42?page=1&sort=desc");
        assert_eq!(sent[0].headers.get("x-fusio-operation-id").unwrap(), "op-1");
        assert_eq!(sent[0].body, OutboundBody::Empty);
    }

    #[tokio::test]
    async fn test_send_encodes_payload() {
        let transport = Arc::new(RecordingTransport::default());
        let sender = Sender::new(transport.clone());
        let config = RequestConfig::new("http://upstream.test/").unwrap();
        let mut values = RequestValues::new(Method::POST);
        values.payload = Some(Payload::Json(json!({"name": "foo"})));

        sender
            .send(&config, &InboundRequest::default(), &CallContext::anonymous("op"), &FixedExtractor(values), None)
            .await
            .unwrap();

        let sent = transport.requests();
        assert_eq!(sent[0].headers.get("content-type").unwrap(), "application/json");
        assert_eq!(sent[0].body, OutboundBody::Bytes(br#"{"name":"foo"}"#.as_slice().into()));
    }

    #[tokio::test]
    async fn test_transport_failure_is_upstream_unavailable() {
        let sender = Sender::new(Arc::new(RecordingTransport::failing()));
        let config = RequestConfig::new("http://upstream.test/").unwrap();

        let err = sender
            .send(&config, &InboundRequest::default(), &CallContext::anonymous("op"), &FixedExtractor(values(Method::GET)), None)
            .await
            .unwrap_err();

        match err {
            DispatchError::UpstreamUnavailable { url, message } => {
                assert_eq!(url, "http://upstream.test/?page=1");
                assert_eq!(message, "connection refused");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_relative_url_without_connection_is_configuration_error() {
        let transport = Arc::new(RecordingTransport::default());
        let sender = Sender::new(transport.clone());
        let config = RequestConfig::new("/items").unwrap();

        let err = sender
            .send(&config, &InboundRequest::default(), &CallContext::anonymous("op"), &FixedExtractor(values(Method::GET)), None)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Configuration(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_connection_supplies_base_url_and_cache() {
        let default_transport = Arc::new(RecordingTransport::default());
        let connection_transport = Arc::new(RecordingTransport::new(vec![RecordingTransport::response(
            200,
            &[("content-type", "application/json"), ("cache-control", "max-age=60")],
            br#"{"cached":true}"#,
        )]));
        let connection = Connection {
            name: "backend".into(),
            base_url: Some(Url::parse("http://backend.test/api/").unwrap()),
            transport: connection_transport.clone(),
            version: None,
            cache: true,
        };
        let sender = Sender::new(default_transport.clone());
        let config = RequestConfig::new("items").unwrap();
        let context = CallContext::anonymous("op");

        for _ in 0..2 {
            let response = sender
                .send(&config, &InboundRequest::default(), &context, &FixedExtractor(RequestValues::new(Method::GET)), Some(&connection))
                .await
                .unwrap();
            assert_eq!(response.body, ResponseBody::Json(json!({"cached": true})));
        }

        assert_eq!(default_transport.call_count(), 0);
        assert_eq!(connection_transport.call_count(), 1);
        assert_eq!(connection_transport.requests()[0].url.as_str(), "http://backend.test/api/items");
    }

    #[tokio::test]
    async fn test_error_status_is_not_an_error() {
        let transport = Arc::new(RecordingTransport::new(vec![RecordingTransport::json(503, r#"{"down":true}"#)]));
        transport.push_error(TransportErrorKind::Timeout, "unused");
        let sender = Sender::new(transport);
        let config = RequestConfig::new("http://upstream.test/").unwrap();

        let response = sender
            .send(&config, &InboundRequest::default(), &CallContext::anonymous("op"), &FixedExtractor(values(Method::GET)), None)
            .await
            .unwrap();
        assert_eq!(response.status.as_u16(), 503);
    }
}
