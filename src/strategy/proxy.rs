//! Request extraction shared by the forwarding strategies.

use http::{HeaderMap, Method};
use indexmap::IndexMap;

use crate::dispatch::context::{CallContext, InboundRequest};
use crate::dispatch::error::DispatchResult;
use crate::dispatch::request_config::{QueryParams, RequestConfig};
use crate::dispatch::rewrite::{apply_authorization, apply_forwarded_host, forwardable_headers};
use crate::dispatch::sender::{RequestExtractor, RequestValues};

/// Passes the inbound call through: method, path params, query, filtered headers and body.
///
/// Calls without an HTTP context become a `POST` carrying only the payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyExtractor;

impl RequestExtractor for ProxyExtractor {
    fn extract(
        &self,
        config: &RequestConfig,
        request: &InboundRequest,
        _context: &CallContext,
    ) -> DispatchResult<RequestValues> {
        let payload = config.payload().or(request.payload.as_ref()).cloned();

        let Some(http) = &request.http else {
            // No passthrough headers, but the configured authorization override still applies.
            let mut headers = HeaderMap::new();
            apply_authorization(&mut headers, config.authorization(), &HeaderMap::new())?;
            return Ok(RequestValues {
                method: Method::POST,
                path_params: IndexMap::new(),
                query: QueryParams::new(),
                headers,
                payload,
            });
        };

        let mut headers = forwardable_headers(&http.headers);
        apply_authorization(&mut headers, config.authorization(), &http.headers)?;
        apply_forwarded_host(&mut headers, &http.headers);

        Ok(RequestValues {
            method: http.method.clone(),
            path_params: http.path_params.clone(),
            query: http.query.clone(),
            headers,
            payload,
        })
    }
}
