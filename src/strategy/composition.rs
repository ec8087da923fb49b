//! Fan-out to every endpoint with results merged by URL.

use std::sync::Arc;

use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use serde_json::{json, Map, Value};

use crate::connection::Connection;
use crate::dispatch::context::{CallContext, InboundRequest};
use crate::dispatch::error::{DispatchError, DispatchResult};
use crate::dispatch::request_config::RequestConfig;
use crate::dispatch::response::{NormalizedResponse, ResponseBody};
use crate::dispatch::sender::Sender;
use crate::strategy::proxy::ProxyExtractor;
use crate::strategy::Action;

/// Calls every configured URL in order and merges the bodies into one object.
///
/// The merged status is always 200. Failed calls are embedded per URL as
/// `{"success": false, "message": ...}`; headers are unioned with later URLs
/// winning.
pub struct Composition {
    sender: Sender,
    configs: Vec<RequestConfig>,
    connection: Option<Arc<Connection>>,
}

impl Composition {
    pub fn new(
        sender: Sender,
        configs: Vec<RequestConfig>,
        connection: Option<Arc<Connection>>,
    ) -> DispatchResult<Self> {
        if configs.is_empty() {
            return Err(DispatchError::configuration("No urls configured"));
        }
        Ok(Self {
            sender,
            configs,
            connection,
        })
    }
}

#[async_trait]
impl Action for Composition {
    fn name(&self) -> &'static str {
        "composition"
    }

    async fn handle(&self, request: &InboundRequest, context: &CallContext) -> DispatchResult<NormalizedResponse> {
        let mut bodies = Map::with_capacity(self.configs.len());
        let mut headers = HeaderMap::new();

        for config in &self.configs {
            let result = self
                .sender
                .send(config, request, context, &ProxyExtractor, self.connection.as_deref())
                .await;

            let body = match result {
                Ok(response) => {
                    merge_headers(&mut headers, &response.headers);
                    response.body.to_value()
                }
                Err(DispatchError::UpstreamUnavailable { url, message }) => {
                    tracing::warn!(url = %url, error = %message, "Composed call failed");
                    json!({"success": false, "message": message})
                }
                Err(e) => return Err(e),
            };
            bodies.insert(config.url().to_string(), body);
        }

        // The merged body is JSON regardless of what the parts declared.
        headers.remove(CONTENT_TYPE);

        Ok(NormalizedResponse::new(
            StatusCode::OK,
            headers,
            ResponseBody::Json(Value::Object(bodies)),
        ))
    }
}

fn merge_headers(target: &mut HeaderMap, source: &HeaderMap) {
    for name in source.keys() {
        target.remove(name);
        for value in source.get_all(name) {
            target.append(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::RecordingTransport;
    use crate::transport::TransportErrorKind;

    fn composition(transport: Arc<RecordingTransport>, urls: &[&str]) -> Composition {
        let configs = urls.iter().map(|u| RequestConfig::new(*u).unwrap()).collect();
        Composition::new(Sender::new(transport), configs, None).unwrap()
    }

    #[tokio::test]
    async fn test_bodies_keyed_by_url_in_configuration_order() {
        let transport = Arc::new(RecordingTransport::new(vec![
            RecordingTransport::response(404, &[("content-type", "application/json"), ("x-shared", "b")], br#"{"id":"b"}"#),
            RecordingTransport::response(200, &[("content-type", "application/json"), ("x-shared", "a"), ("x-only-a", "1")], br#"{"id":"a"}"#),
        ]));
        let action = composition(transport.clone(), &["http://b.test/", "http://a.test/"]);

        let response = action
            .handle(&InboundRequest::default(), &CallContext::anonymous("compose"))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        let ResponseBody::Json(Value::Object(body)) = &response.body else {
            panic!("expected an object body");
        };
        let keys: Vec<&String> = body.keys().collect();
        assert_eq!(keys, ["http://b.test/", "http://a.test/"]);
        assert_eq!(body["http://b.test/"], json!({"id": "b"}));
        assert_eq!(response.headers.get("x-shared").unwrap(), "a");
        assert_eq!(response.headers.get("x-only-a").unwrap(), "1");
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_partial_failure_is_embedded() {
        let transport = Arc::new(RecordingTransport::default());
        transport.push_error(TransportErrorKind::Connect, "connection refused");
        let action = composition(transport, &["http://down.test/", "http://up.test/"]);

        let response = action
            .handle(&InboundRequest::default(), &CallContext::anonymous("compose"))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.body.to_value(),
            json!({
                "http://down.test/": {"success": false, "message": "connection refused"},
                "http://up.test/": null,
            })
        );
    }

    #[test]
    fn test_empty_list_is_configuration_error() {
        let result = Composition::new(Sender::default(), Vec::new(), None);
        assert!(matches!(result, Err(DispatchError::Configuration(_))));
    }
}
