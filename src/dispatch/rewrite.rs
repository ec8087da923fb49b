//! Header and URL rewriting rules.
//!
//! # Responsibilities
//! - Strip hop-by-hop and identity-sensitive inbound headers
//! - Inject identity/trust headers, `accept` and `user-agent`
//! - Resolve authorization precedence and `x-forwarded-host`
//! - Substitute `:name` URL placeholders and layer query parameters
//!
//! All functions are pure transformations over their inputs.

use http::header::{HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, HOST, PROXY_AUTHORIZATION, USER_AGENT};
use http::HeaderMap;
use indexmap::IndexMap;
use url::Url;

use crate::dispatch::context::CallContext;
use crate::dispatch::error::{DispatchError, DispatchResult};
use crate::dispatch::request_config::{header_str, QueryParams};

/// Headers meaningful for a single transport leg only.
pub const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Inbound headers the engine replaces with its own values.
pub const REPLACED_REQUEST_HEADERS: [&str; 8] = [
    "accept",
    "accept-charset",
    "accept-encoding",
    "accept-language",
    "authorization",
    "content-type",
    "host",
    "user-agent",
];

pub const ACCEPT_VALUE: &str = "application/json, application/x-www-form-urlencoded;q=0.9, */*;q=0.8";

pub const USER_AGENT_VALUE: &str = concat!("Fusio Adapter-HTTP v", env!("CARGO_PKG_VERSION"));

pub const X_FUSIO_OPERATION_ID: &str = "x-fusio-operation-id";
pub const X_FUSIO_USER_ANONYMOUS: &str = "x-fusio-user-anonymous";
pub const X_FUSIO_USER_ID: &str = "x-fusio-user-id";
pub const X_FUSIO_USER_NAME: &str = "x-fusio-user-name";
pub const X_FUSIO_APP_ID: &str = "x-fusio-app-id";
pub const X_FUSIO_APP_KEY: &str = "x-fusio-app-key";
pub const X_FUSIO_REMOTE_IP: &str = "x-fusio-remote-ip";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// True for headers that must never cross the proxy boundary.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Copy of `inbound` without hop-by-hop and replaced headers.
pub fn forwardable_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        let stripped = is_hop_by_hop(name.as_str())
            || REPLACED_REQUEST_HEADERS.contains(&name.as_str());
        if !stripped {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// Explicit override wins, else the inbound `proxy-authorization` is forwarded.
pub fn apply_authorization(
    headers: &mut HeaderMap,
    authorization_override: Option<&str>,
    inbound: &HeaderMap,
) -> DispatchResult<()> {
    let value = authorization_override
        .filter(|v| !v.trim().is_empty())
        .or_else(|| header_str(inbound, PROXY_AUTHORIZATION.as_str()));
    if let Some(value) = value {
        headers.insert(AUTHORIZATION, header_value(AUTHORIZATION.as_str(), value)?);
    }
    Ok(())
}

/// Mirror the inbound `host` header as `x-forwarded-host`.
pub fn apply_forwarded_host(headers: &mut HeaderMap, inbound: &HeaderMap) {
    if let Some(host) = inbound.get(HOST).filter(|v| !v.is_empty()) {
        headers.insert(HeaderName::from_static(X_FORWARDED_HOST), host.clone());
    }
}

/// Inject identity/trust headers plus `accept` and `user-agent`.
///
/// Id/name/key headers of anonymous users and apps are omitted entirely.
pub fn inject_identity_headers(headers: &mut HeaderMap, context: &CallContext) -> DispatchResult<()> {
    set(headers, X_FUSIO_OPERATION_ID, &context.operation_id)?;
    set(
        headers,
        X_FUSIO_USER_ANONYMOUS,
        if context.user.anonymous { "1" } else { "0" },
    )?;

    if !context.user.anonymous {
        set(headers, X_FUSIO_USER_ID, &context.user.id)?;
        set(headers, X_FUSIO_USER_NAME, &context.user.name)?;
    }

    if !context.app.anonymous {
        set(headers, X_FUSIO_APP_ID, &context.app.id)?;
        set(headers, X_FUSIO_APP_KEY, &context.app.app_key)?;
    }

    let ip = context.remote_ip().to_string();
    set(headers, X_FUSIO_REMOTE_IP, &ip)?;
    set(headers, X_FORWARDED_FOR, &ip)?;

    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    Ok(())
}

/// Convert configured `name => value` pairs into a header map.
pub fn headers_from_config(configured: &IndexMap<String, String>) -> DispatchResult<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(configured.len());
    for (name, value) in configured {
        let header_name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| DispatchError::configuration(format!("Invalid header name '{}'", name)))?;
        let header_value = header_value(name, value)?;
        headers.append(header_name, header_value);
    }
    Ok(headers)
}

/// Replace every `:name` token with the matching path parameter.
///
/// Names are the longest run of `[A-Za-z0-9_]` after the colon, so `:id`
/// never clobbers `:identity`. Unknown names are left verbatim.
pub fn substitute_placeholders(url: &str, params: &IndexMap<String, String>) -> String {
    if params.is_empty() || !url.contains(':') {
        return url.to_string();
    }

    let mut out = String::with_capacity(url.len());
    let mut rest = url;
    while let Some(pos) = rest.find(':') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let name = &after[..name_len];
        match params.get(name) {
            Some(value) if !name.is_empty() => out.push_str(value),
            _ => {
                out.push(':');
                out.push_str(name);
            }
        }
        rest = &after[name_len..];
    }
    out.push_str(rest);
    out
}

/// Parse `url`, resolving relative URLs against the connection base.
pub fn resolve_url(url: &str, base: Option<&Url>) -> DispatchResult<Url> {
    let url = url.trim();
    if url.is_empty() {
        return Err(DispatchError::configuration("No url configured"));
    }

    match Url::parse(url) {
        Ok(parsed) => Ok(parsed),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base
                .join(url)
                .map_err(|e| DispatchError::configuration(format!("Invalid url '{}': {}", url, e))),
            None => Err(DispatchError::configuration(format!(
                "Relative url '{}' requires a connection with a base url",
                url
            ))),
        },
        Err(e) => Err(DispatchError::configuration(format!("Invalid url '{}': {}", url, e))),
    }
}

/// Layer query parameters onto `url`.
///
/// Pairs already in the URL are the base, `dynamic` overrides them and
/// `fixed` overrides both.
pub fn apply_query(url: &mut Url, dynamic: &QueryParams, fixed: Option<&QueryParams>) {
    let mut merged: QueryParams = url.query_pairs().into_owned().collect();
    merged.merge(dynamic);
    if let Some(fixed) = fixed {
        merged.merge(fixed);
    }

    if merged.is_empty() {
        url.set_query(None);
        return;
    }

    url.query_pairs_mut().clear().extend_pairs(merged.iter());
}

fn set(headers: &mut HeaderMap, name: &'static str, value: &str) -> DispatchResult<()> {
    headers.insert(HeaderName::from_static(name), header_value(name, value)?);
    Ok(())
}

fn header_value(name: &str, value: &str) -> DispatchResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| DispatchError::configuration(format!("Invalid value for header '{}'", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::context::{AppIdentity, UserIdentity};

    fn params(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_forwardable_headers_strips_sensitive_and_hop_by_hop() {
        let mut inbound = HeaderMap::new();
        for name in REPLACED_REQUEST_HEADERS.iter().chain(HOP_BY_HOP_HEADERS.iter()) {
            inbound.insert(HeaderName::from_static(*name), HeaderValue::from_static("x"));
        }
        inbound.insert("x-custom", HeaderValue::from_static("kept"));

        let headers = forwardable_headers(&inbound);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-custom").unwrap(), "kept");
    }

    #[test]
    fn test_authorization_precedence() {
        let mut inbound = HeaderMap::new();
        inbound.insert(PROXY_AUTHORIZATION, HeaderValue::from_static("Basic proxy"));

        let mut headers = HeaderMap::new();
        apply_authorization(&mut headers, Some("Bearer override"), &inbound).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer override");

        let mut headers = HeaderMap::new();
        apply_authorization(&mut headers, None, &inbound).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Basic proxy");

        let mut headers = HeaderMap::new();
        apply_authorization(&mut headers, None, &HeaderMap::new()).unwrap();
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_forwarded_host() {
        let mut inbound = HeaderMap::new();
        inbound.insert(HOST, HeaderValue::from_static("api.example.com"));
        let mut headers = HeaderMap::new();
        apply_forwarded_host(&mut headers, &inbound);
        assert_eq!(headers.get(X_FORWARDED_HOST).unwrap(), "api.example.com");
    }

    #[test]
    fn test_identity_headers_for_known_caller() {
        let context = CallContext::anonymous("34")
            .with_user(UserIdentity::new("2", "Consumer"))
            .with_app(AppIdentity::new("3", "5347307d-d801-4075-9aaa-a21a29a448c5"));

        let mut headers = HeaderMap::new();
        inject_identity_headers(&mut headers, &context).unwrap();

        assert_eq!(headers.get(X_FUSIO_OPERATION_ID).unwrap(), "34");
        assert_eq!(headers.get(X_FUSIO_USER_ANONYMOUS).unwrap(), "0");
        assert_eq!(headers.get(X_FUSIO_USER_ID).unwrap(), "2");
        assert_eq!(headers.get(X_FUSIO_USER_NAME).unwrap(), "Consumer");
        assert_eq!(headers.get(X_FUSIO_APP_ID).unwrap(), "3");
        assert_eq!(
            headers.get(X_FUSIO_APP_KEY).unwrap(),
            "5347307d-d801-4075-9aaa-a21a29a448c5"
        );
        assert_eq!(headers.get(X_FUSIO_REMOTE_IP).unwrap(), "127.0.0.1");
        assert_eq!(headers.get(X_FORWARDED_FOR).unwrap(), "127.0.0.1");
        assert_eq!(headers.get(ACCEPT).unwrap(), ACCEPT_VALUE);
        assert!(headers
            .get(USER_AGENT)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("Fusio Adapter-HTTP v"));
    }

    #[test]
    fn test_identity_headers_omitted_when_anonymous() {
        let context = CallContext::anonymous("7").with_client_ip("10.0.0.5".parse().unwrap());
        let mut headers = HeaderMap::new();
        inject_identity_headers(&mut headers, &context).unwrap();

        assert_eq!(headers.get(X_FUSIO_USER_ANONYMOUS).unwrap(), "1");
        for name in [X_FUSIO_USER_ID, X_FUSIO_USER_NAME, X_FUSIO_APP_ID, X_FUSIO_APP_KEY] {
            assert!(headers.get(name).is_none(), "{} must be omitted", name);
        }
        assert_eq!(headers.get(X_FORWARDED_FOR).unwrap(), "10.0.0.5");
    }

    #[test]
    fn test_placeholder_substitution() {
        let p = params(&[("id", "42"), ("identity", "me")]);
        assert_eq!(
            substitute_placeholders("http://x/foo/:id", &p),
            "http://x/foo/42"
        );
        assert_eq!(
            substitute_placeholders("http://x/:identity/:id/:missing", &p),
            "http://x/me/42/:missing"
        );
        assert_eq!(
            substitute_placeholders("http://x:8080/foo/:id", &p),
            "http://x:8080/foo/42"
        );
    }

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("http://api.internal/v1/").unwrap();
        assert_eq!(
            resolve_url("users", Some(&base)).unwrap().as_str(),
            "http://api.internal/v1/users"
        );
        assert_eq!(
            resolve_url("http://other/x", Some(&base)).unwrap().as_str(),
            "http://other/x"
        );
        assert!(matches!(
            resolve_url("/users", None),
            Err(DispatchError::Configuration(_))
        ));
    }

    #[test]
    fn test_apply_query_layers() {
        let mut url = Url::parse("http://x/foo?base=1&foo=url").unwrap();
        let dynamic = QueryParams::parse("foo=dynamic&page=2").unwrap();
        let fixed = QueryParams::parse("page=fixed").unwrap();
        apply_query(&mut url, &dynamic, Some(&fixed));
        assert_eq!(url.as_str(), "http://x/foo?base=1&foo=dynamic&page=fixed");

        let mut url = Url::parse("http://x/foo").unwrap();
        apply_query(&mut url, &QueryParams::new(), None);
        assert_eq!(url.as_str(), "http://x/foo");
    }

    #[test]
    fn test_headers_from_config() {
        let configured = params(&[("X-Foo", "Bar")]);
        let headers = headers_from_config(&configured).unwrap();
        assert_eq!(headers.get("x-foo").unwrap(), "Bar");

        let invalid = params(&[("bad header", "x")]);
        assert!(headers_from_config(&invalid).is_err());
    }
}
