//! HTTP caching decorator (private cache semantics).
//!
//! # Responsibilities
//! - Serve fresh stored responses without a round-trip
//! - Revalidate stale responses that carry validators
//! - Store cacheable responses keyed by method + URL, one variant per `vary` match
//!
//! # Design Decisions
//! - Storability, freshness and conditional headers come from `http_cache_semantics::CachePolicy`
//!   configured as a private cache without heuristic freshness
//! - Only GET and HEAD are cached, and only the statuses in `CACHEABLE_STATUSES`
//! - Responses without a lifetime are kept only when they can be revalidated
//! - Delta-seconds above 2^31 are clamped before the policy sees them (RFC 9111 §1.2.2)

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use http::header::{HeaderValue, AGE, CACHE_CONTROL, ETAG, LAST_MODIFIED, VARY};
use http::{HeaderMap, Method, StatusCode, Uri};
use http_cache_semantics::{AfterResponse, BeforeRequest, CacheOptions, CachePolicy};

use crate::observability::metrics;
use crate::transport::clock::{Clock, SystemClock};
use crate::transport::store::{CacheStore, CachedResponse};
use crate::transport::{HttpTransport, OutboundRequest, TransportError, TransportResponse};

/// Statuses that may be stored.
const CACHEABLE_STATUSES: [u16; 10] = [200, 203, 204, 300, 301, 404, 405, 410, 414, 501];

/// Largest delta-seconds value a cache must represent.
const MAX_DELTA_SECONDS: u64 = 2_147_483_648;

/// Transport decorator adding HTTP caching.
pub struct CachingTransport {
    inner: Arc<dyn HttpTransport>,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl CachingTransport {
    pub fn new(inner: Arc<dyn HttpTransport>, store: Arc<dyn CacheStore>) -> Self {
        Self::with_clock(inner, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        inner: Arc<dyn HttpTransport>,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { inner, store, clock }
    }

    /// Replace the variant serving `policy_request` with `entry`.
    fn put_variant(&self, key: &str, policy_request: &http::Request<()>, entry: CachedResponse, now: SystemTime) {
        let mut variants = self.store.get(key).unwrap_or_default();
        variants.retain(|v| !serves(&v.policy, policy_request, now));
        variants.push(entry);
        self.store.put(key, variants);
    }

    fn store_response(&self, key: &str, policy_request: &http::Request<()>, response: &TransportResponse, now: SystemTime) {
        let Some(entry) = to_entry(policy_request, response, now) else {
            return;
        };
        self.put_variant(key, policy_request, entry, now);
        tracing::debug!(key = %key, "Stored response in cache");
    }
}

#[async_trait]
impl HttpTransport for CachingTransport {
    async fn execute(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let cacheable_method = request.method == Method::GET || request.method == Method::HEAD;
        if !cacheable_method || has_directive(&request.headers, "no-store") {
            return self.inner.execute(request).await;
        }
        let Some(policy_request) = policy_request(&request) else {
            return self.inner.execute(request).await;
        };

        let key = cache_key(&request);
        let now = self.clock.now();
        let variants = self.store.get(&key).unwrap_or_default();

        for cached in variants {
            match cached.policy.before_request(&policy_request, now) {
                BeforeRequest::Fresh(parts) => {
                    metrics::record_cache("hit");
                    tracing::debug!(key = %key, "Serving response from cache");
                    return Ok(TransportResponse {
                        status: cached.status,
                        headers: parts.headers,
                        body: cached.body,
                    });
                }
                BeforeRequest::Stale { request: conditional, matches: true } => {
                    let mut revalidation = request.clone();
                    revalidation.headers = conditional.headers;
                    let response = self.inner.execute(revalidation).await?;

                    let policy_response = policy_response(response.status, &response.headers);
                    match cached.policy.after_response(&policy_request, &policy_response, now) {
                        AfterResponse::NotModified(policy, parts) => {
                            let headers = parts.headers;
                            let refreshed = CachedResponse {
                                status: cached.status,
                                headers: headers.clone(),
                                body: cached.body.clone(),
                                policy,
                            };
                            self.put_variant(&key, &policy_request, refreshed, now);
                            metrics::record_cache("revalidated");
                            return Ok(TransportResponse {
                                status: cached.status,
                                headers,
                                body: cached.body,
                            });
                        }
                        AfterResponse::Modified(..) => {
                            self.store_response(&key, &policy_request, &response, now);
                            metrics::record_cache("miss");
                            return Ok(response);
                        }
                    }
                }
                BeforeRequest::Stale { matches: false, .. } => continue,
            }
        }

        metrics::record_cache("miss");
        let response = self.inner.execute(request).await?;
        self.store_response(&key, &policy_request, &response, now);
        Ok(response)
    }
}

fn cache_key(request: &OutboundRequest) -> String {
    format!("{} {}", request.method, request.url)
}

fn options() -> CacheOptions {
    CacheOptions {
        shared: false,
        cache_heuristic: 0.0,
        ..CacheOptions::default()
    }
}

/// Whether a stored policy answers `request` (fresh or after revalidation).
fn serves(policy: &CachePolicy, request: &http::Request<()>, now: SystemTime) -> bool {
    matches!(
        policy.before_request(request, now),
        BeforeRequest::Fresh(_) | BeforeRequest::Stale { matches: true, .. }
    )
}

fn policy_request(request: &OutboundRequest) -> Option<http::Request<()>> {
    let uri: Uri = request.url.as_str().parse().ok()?;
    let mut policy_request = http::Request::new(());
    *policy_request.method_mut() = request.method.clone();
    *policy_request.uri_mut() = uri;
    *policy_request.headers_mut() = clamp_delta_seconds(&request.headers);
    Some(policy_request)
}

fn policy_response(status: StatusCode, headers: &HeaderMap) -> http::Response<()> {
    let mut response = http::Response::new(());
    *response.status_mut() = status;
    *response.headers_mut() = clamp_delta_seconds(headers);
    response
}

fn has_directive(headers: &HeaderMap, directive: &str) -> bool {
    headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|d| d.trim().eq_ignore_ascii_case(directive))
}

fn varies_on_everything(headers: &HeaderMap) -> bool {
    headers
        .get_all(VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|name| name.trim() == "*")
}

fn has_validators(headers: &HeaderMap) -> bool {
    headers.contains_key(ETAG) || headers.contains_key(LAST_MODIFIED)
}

/// Copy `headers` with `max-age`, `s-maxage` and `age` capped at 2^31 seconds.
fn clamp_delta_seconds(headers: &HeaderMap) -> HeaderMap {
    let mut clamped = headers.clone();

    let cache_control: Vec<String> = headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .map(|directive| {
                    let mut parts = directive.splitn(2, '=');
                    let name = parts.next().unwrap_or_default().trim();
                    match parts.next() {
                        Some(seconds)
                            if name.eq_ignore_ascii_case("max-age")
                                || name.eq_ignore_ascii_case("s-maxage") =>
                        {
                            format!("{}={}", name, clamp_seconds(seconds.trim().trim_matches('"')))
                        }
                        _ => directive.trim().to_string(),
                    }
                })
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect();
    if !cache_control.is_empty() {
        clamped.remove(CACHE_CONTROL);
        for value in cache_control {
            if let Ok(value) = HeaderValue::from_str(&value) {
                clamped.append(CACHE_CONTROL, value);
            }
        }
    }

    if let Some(age) = headers.get(AGE).and_then(|v| v.to_str().ok()) {
        if let Ok(value) = HeaderValue::from_str(&clamp_seconds(age.trim())) {
            clamped.insert(AGE, value);
        }
    }
    clamped
}

fn clamp_seconds(seconds: &str) -> String {
    let too_large = !seconds.is_empty()
        && seconds.bytes().all(|b| b.is_ascii_digit())
        && seconds.parse::<u64>().map_or(true, |s| s > MAX_DELTA_SECONDS);
    if too_large {
        MAX_DELTA_SECONDS.to_string()
    } else {
        seconds.to_string()
    }
}

fn to_entry(
    policy_request: &http::Request<()>,
    response: &TransportResponse,
    now: SystemTime,
) -> Option<CachedResponse> {
    if !CACHEABLE_STATUSES.contains(&response.status.as_u16()) || varies_on_everything(&response.headers) {
        return None;
    }

    let policy = CachePolicy::new_options(
        policy_request,
        &policy_response(response.status, &response.headers),
        now,
        options(),
    );
    if !policy.is_storable() {
        return None;
    }
    if policy.time_to_live(now).is_zero() && !has_validators(&response.headers) {
        return None;
    }

    Some(CachedResponse {
        status: response.status,
        headers: response.headers.clone(),
        body: response.body.clone(),
        policy,
    })
}
