//! Fully templated outbound request.
//!
//! # Responsibilities
//! - Render URL, header values and body from configuration templates
//! - Convert the rendered body into a payload matching the configured content type
//!
//! # Design Decisions
//! - Inbound headers are never forwarded; header values come from configuration
//! - The inbound query is forwarded with the configured fixed query layered over it
//! - The template context is `{payload, arguments, uriFragments, query, context}`,
//!   where `query` is the same merged query that goes out on the wire
//! - An absent or empty body template sends no body
//! - Multipart cannot be produced from a rendered string and is rejected up front

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::config::schema::{RawActionConfig, RAW_METHODS};
use crate::connection::Connection;
use crate::dispatch::context::{CallContext, InboundRequest};
use crate::dispatch::error::{DispatchError, DispatchResult};
use crate::dispatch::payload::{Payload, XmlDocument};
use crate::dispatch::request_config::{ContentType, QueryParams, RequestConfig};
use crate::dispatch::response::NormalizedResponse;
use crate::dispatch::rewrite::headers_from_config;
use crate::dispatch::sender::{RequestExtractor, RequestValues, Sender};
use crate::strategy::template::{JinjaTemplate, TemplateRenderer};
use crate::strategy::Action;

/// Sends a request shaped entirely by configuration.
pub struct RawAction {
    sender: Sender,
    config: RequestConfig,
    method: Method,
    headers: IndexMap<String, String>,
    renderer: Arc<dyn TemplateRenderer>,
    connection: Option<Arc<Connection>>,
}

impl RawAction {
    pub fn new(
        sender: Sender,
        raw: &RawActionConfig,
        connection: Option<Arc<Connection>>,
    ) -> DispatchResult<Self> {
        let method = raw.method.trim().to_ascii_uppercase();
        if !RAW_METHODS.contains(&method.as_str()) {
            return Err(DispatchError::configuration(format!(
                "Unsupported method '{}', expected one of {}",
                raw.method,
                RAW_METHODS.join(", ")
            )));
        }
        let method = method
            .parse::<Method>()
            .map_err(|e| DispatchError::configuration(e.to_string()))?;

        let config = RequestConfig::for_raw(&raw.url, raw)?;
        if config.effective_content_type() == ContentType::Multipart {
            return Err(DispatchError::configuration(
                "Raw actions cannot send multipart bodies",
            ));
        }

        Ok(Self {
            sender,
            config,
            method,
            headers: raw.headers.clone(),
            renderer: Arc::new(JinjaTemplate),
            connection,
        })
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }
}

#[async_trait]
impl Action for RawAction {
    fn name(&self) -> &'static str {
        "raw"
    }

    async fn handle(&self, request: &InboundRequest, context: &CallContext) -> DispatchResult<NormalizedResponse> {
        let template_context = template_context(request, context, self.config.query());
        let url = self.renderer.render(self.config.url(), &template_context)?;
        let config = self.config.clone().with_url(url)?;

        let extractor = RawExtractor {
            method: &self.method,
            headers: &self.headers,
            renderer: self.renderer.as_ref(),
            template_context: &template_context,
        };

        self.sender
            .send(&config, request, context, &extractor, self.connection.as_deref())
            .await
    }
}

/// Values of a raw call: configured method and headers, rendered body.
struct RawExtractor<'a> {
    method: &'a Method,
    headers: &'a IndexMap<String, String>,
    renderer: &'a dyn TemplateRenderer,
    template_context: &'a Value,
}

impl RequestExtractor for RawExtractor<'_> {
    fn extract(
        &self,
        config: &RequestConfig,
        request: &InboundRequest,
        _context: &CallContext,
    ) -> DispatchResult<RequestValues> {
        let rendered = self
            .headers
            .iter()
            .map(|(name, value)| Ok((name.clone(), self.renderer.render(value, self.template_context)?)))
            .collect::<DispatchResult<IndexMap<String, String>>>()?;

        let payload = match config.payload() {
            Some(Payload::Text(template)) => {
                let body = self.renderer.render(template, self.template_context)?;
                to_payload(config.effective_content_type(), body)?
            }
            other => other.cloned(),
        };

        Ok(RequestValues {
            method: self.method.clone(),
            path_params: request.path_params().cloned().unwrap_or_default(),
            query: request.http.as_ref().map(|h| h.query.clone()).unwrap_or_default(),
            headers: headers_from_config(&rendered)?,
            payload,
        })
    }
}

/// Context exposed to raw templates; `fixed` is layered over the inbound query.
pub fn template_context(request: &InboundRequest, context: &CallContext, fixed: Option<&QueryParams>) -> Value {
    let string_map = |map: &IndexMap<String, String>| {
        Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect::<Map<_, _>>(),
        )
    };

    let mut query = request.http.as_ref().map(|h| h.query.clone()).unwrap_or_default();
    if let Some(fixed) = fixed {
        query.merge(fixed);
    }

    json!({
        "payload": request.payload.as_ref().map(Payload::to_value).unwrap_or(Value::Null),
        "arguments": string_map(&request.arguments),
        "uriFragments": request.path_params().map(string_map).unwrap_or_else(|| json!({})),
        "query": query.to_value(),
        "context": context.to_value(),
    })
}

fn to_payload(content_type: ContentType, body: String) -> DispatchResult<Option<Payload>> {
    if body.is_empty() {
        return Ok(None);
    }

    let payload = match content_type {
        ContentType::Json => Payload::Json(serde_json::from_str(&body).map_err(|e| {
            DispatchError::invalid_payload(format!("Rendered body is not valid JSON: {}", e))
        })?),
        ContentType::Form => {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_str(&body).map_err(|e| {
                DispatchError::invalid_payload(format!("Rendered body is not a valid form: {}", e))
            })?;
            Payload::Json(Value::Object(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect(),
            ))
        }
        ContentType::Xml => Payload::Xml(XmlDocument::new(body)),
        ContentType::Binary => Payload::Binary(Bytes::from(body)),
        ContentType::Text => Payload::Text(body),
        ContentType::Multipart => {
            return Err(DispatchError::configuration("Raw actions cannot send multipart bodies"))
        }
    };
    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::context::{HttpRequestContext, UserIdentity};
    use crate::transport::mock::RecordingTransport;
    use crate::transport::OutboundBody;
    use http::HeaderValue;

    fn raw_action(transport: Arc<RecordingTransport>, raw: RawActionConfig) -> RawAction {
        RawAction::new(Sender::new(transport), &raw, None).unwrap()
    }

    fn body_of(body: &OutboundBody) -> &[u8] {
        match body {
            OutboundBody::Bytes(b) => b,
            other => panic!("expected bytes, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_body_rendered_from_query_and_payload() {
        let transport = Arc::new(RecordingTransport::default());
        let mut raw = RawActionConfig::new("http://hooks.test/notify");
        raw.method = "POST".into();
        raw.body = Some("{{query.foo}}-{{payload.bar}}".into());
        let action = raw_action(transport.clone(), raw);

        let mut http = HttpRequestContext::new(Method::GET);
        http.query.insert("foo", "1");
        http.headers.insert("x-inbound", HeaderValue::from_static("dropped"));
        let request = InboundRequest::http(http).with_payload(Payload::Json(json!({"bar": 2})));

        action.handle(&request, &CallContext::anonymous("notify")).await.unwrap();

        let sent = transport.requests();
        assert_eq!(sent[0].method, Method::POST);
        assert_eq!(sent[0].url.as_str(), "http://hooks.test/notify?foo=1");
        assert_eq!(body_of(&sent[0].body), b"1-2");
        assert_eq!(sent[0].headers.get("content-type").unwrap(), "text/plain");
        assert!(sent[0].headers.get("x-inbound").is_none());
    }

    #[tokio::test]
    async fn test_json_body_and_templated_headers() {
        let transport = Arc::new(RecordingTransport::default());
        let mut raw = RawActionConfig::new("http://hooks.test/users/{{ context.user.id }}?source=raw");
        raw.method = "put".into();
        raw.headers.insert("Content-Type".into(), "application/json".into());
        raw.headers.insert("X-User".into(), "{{ context.user.name }}".into());
        raw.body = Some(r#"{"name": "{{ arguments.name }}"}"#.into());
        let action = raw_action(transport.clone(), raw);

        let request = InboundRequest::default().with_argument("name", "foo");
        let context = CallContext::anonymous("update").with_user(UserIdentity::new("7", "jane"));
        action.handle(&request, &context).await.unwrap();

        let sent = transport.requests();
        assert_eq!(sent[0].method, Method::PUT);
        assert_eq!(sent[0].url.as_str(), "http://hooks.test/users/7?source=raw");
        assert_eq!(sent[0].headers.get("x-user").unwrap(), "jane");
        assert_eq!(sent[0].headers.get("x-fusio-user-id").unwrap(), "7");
        assert_eq!(body_of(&sent[0].body), br#"{"name":"foo"}"#);
    }

    #[tokio::test]
    async fn test_no_template_sends_no_body() {
        let transport = Arc::new(RecordingTransport::default());
        let action = raw_action(transport.clone(), RawActionConfig::new("http://hooks.test/ping"));

        action
            .handle(&InboundRequest::default(), &CallContext::anonymous("ping"))
            .await
            .unwrap();

        let sent = transport.requests();
        assert_eq!(sent[0].method, Method::GET);
        assert_eq!(sent[0].body, OutboundBody::Empty);
    }

    #[tokio::test]
    async fn test_invalid_rendered_json_fails_before_network() {
        let transport = Arc::new(RecordingTransport::default());
        let mut raw = RawActionConfig::new("http://hooks.test/");
        raw.headers.insert("content-type".into(), "application/json".into());
        raw.body = Some("{not json".into());
        let action = raw_action(transport.clone(), raw);

        let err = action
            .handle(&InboundRequest::default(), &CallContext::anonymous("bad"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidPayload(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fixed_query_overrides_inbound_query() {
        let transport = Arc::new(RecordingTransport::default());
        let mut raw = RawActionConfig::new("http://hooks.test/x");
        raw.query = Some("fixed=1".into());
        let action = raw_action(transport.clone(), raw);

        let mut http = HttpRequestContext::new(Method::GET);
        http.query.insert("foo", "1");
        http.query.insert("fixed", "0");
        action
            .handle(&InboundRequest::http(http), &CallContext::anonymous("x"))
            .await
            .unwrap();

        let sent = transport.requests();
        assert_eq!(sent[0].url.as_str(), "http://hooks.test/x?foo=1&fixed=1");
    }

    #[tokio::test]
    async fn test_template_query_includes_fixed_query() {
        let transport = Arc::new(RecordingTransport::default());
        let mut raw = RawActionConfig::new("http://hooks.test/x");
        raw.method = "POST".into();
        raw.query = Some("fixed=1&mode=batch".into());
        raw.body = Some("{{ query.foo }}/{{ query.fixed }}/{{ query.mode }}".into());
        let action = raw_action(transport.clone(), raw);

        let mut http = HttpRequestContext::new(Method::GET);
        http.query.insert("foo", "a");
        http.query.insert("fixed", "0");
        action
            .handle(&InboundRequest::http(http), &CallContext::anonymous("x"))
            .await
            .unwrap();

        let sent = transport.requests();
        assert_eq!(body_of(&sent[0].body), b"a/1/batch");
    }

    #[tokio::test]
    async fn test_jinja_filters_in_body() {
        let transport = Arc::new(RecordingTransport::default());
        let mut raw = RawActionConfig::new("http://hooks.test/x");
        raw.method = "POST".into();
        raw.body = Some("{{ payload.bar|upper }}{% if payload.flag %}!{% endif %}".into());
        let action = raw_action(transport.clone(), raw);

        let request = InboundRequest::default().with_payload(Payload::Json(json!({"bar": "x", "flag": true})));
        action.handle(&request, &CallContext::anonymous("x")).await.unwrap();

        assert_eq!(body_of(&transport.requests()[0].body), b"X!");
    }

    #[tokio::test]
    async fn test_broken_template_fails_before_network() {
        let transport = Arc::new(RecordingTransport::default());
        let mut raw = RawActionConfig::new("http://hooks.test/x");
        raw.headers.insert("X-Broken".into(), "{{ payload.bar".into());
        let action = raw_action(transport.clone(), raw);

        let err = action
            .handle(&InboundRequest::default(), &CallContext::anonymous("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Configuration(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn test_multipart_content_type_is_configuration_error() {
        let mut raw = RawActionConfig::new("http://hooks.test/");
        raw.headers.insert("Content-Type".into(), "multipart/form-data".into());
        let result = RawAction::new(Sender::default(), &raw, None);
        assert!(matches!(result, Err(DispatchError::Configuration(_))));
    }

    #[test]
    fn test_unsupported_method_is_configuration_error() {
        let mut raw = RawActionConfig::new("http://hooks.test/");
        raw.method = "TRACE".into();
        let result = RawAction::new(Sender::default(), &raw, None);
        assert!(matches!(result, Err(DispatchError::Configuration(_))));
    }
}
