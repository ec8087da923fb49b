//! Per-call request configuration.
//!
//! # Responsibilities
//! - Describe one outbound call (url, content type, protocol, auth, query, cache)
//! - Build that description from action configuration without side effects
//!
//! # Design Decisions
//! - `RequestConfig` is immutable once built; strategies build a new one per URL
//! - Fixed query strings are parsed once, at build time
//! - An empty URL is rejected here, before any network code sees it

use std::fmt;
use std::str::FromStr;

use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::config::schema::{ProxyOptions, RawActionConfig};
use crate::dispatch::error::{DispatchError, DispatchResult};
use crate::dispatch::payload::Payload;

/// Content type used to encode the outbound body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ContentType {
    Binary,
    Form,
    #[default]
    Json,
    Multipart,
    Text,
    Xml,
}

impl ContentType {
    pub const ALL: [ContentType; 6] = [
        ContentType::Binary,
        ContentType::Form,
        ContentType::Json,
        ContentType::Multipart,
        ContentType::Text,
        ContentType::Xml,
    ];

    /// The media type sent on the wire.
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Binary => "application/octet-stream",
            ContentType::Form => "application/x-www-form-urlencoded",
            ContentType::Json => "application/json",
            ContentType::Multipart => "multipart/form-data",
            ContentType::Text => "text/plain",
            ContentType::Xml => "application/xml",
        }
    }

    fn short_name(&self) -> &'static str {
        match self {
            ContentType::Binary => "binary",
            ContentType::Form => "form",
            ContentType::Json => "json",
            ContentType::Multipart => "multipart",
            ContentType::Text => "text",
            ContentType::Xml => "xml",
        }
    }

    /// Resolve a content type from a header value such as `application/json; charset=utf-8`.
    pub fn from_header_value(value: &str) -> Option<Self> {
        let essence = value.split(';').next().unwrap_or_default().trim();
        Self::ALL
            .into_iter()
            .find(|t| t.mime().eq_ignore_ascii_case(essence))
    }
}

impl FromStr for ContentType {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.short_name().eq_ignore_ascii_case(value))
            .or_else(|| Self::from_header_value(value))
            .ok_or_else(|| DispatchError::configuration(format!("Unknown content type '{}'", s)))
    }
}

impl TryFrom<String> for ContentType {
    type Error = DispatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentType> for String {
    fn from(value: ContentType) -> Self {
        value.mime().to_string()
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// HTTP protocol version requested for the outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProtocolVersion {
    Http10,
    Http11,
    Http2,
    Http3,
}

impl ProtocolVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::Http10 => "1.0",
            ProtocolVersion::Http11 => "1.1",
            ProtocolVersion::Http2 => "2.0",
            ProtocolVersion::Http3 => "3.0",
        }
    }

    pub fn to_http(self) -> http::Version {
        match self {
            ProtocolVersion::Http10 => http::Version::HTTP_10,
            ProtocolVersion::Http11 => http::Version::HTTP_11,
            ProtocolVersion::Http2 => http::Version::HTTP_2,
            ProtocolVersion::Http3 => http::Version::HTTP_3,
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        let value = value
            .strip_prefix("HTTP/")
            .or_else(|| value.strip_prefix("http/"))
            .unwrap_or(value);
        match value {
            "1.0" => Ok(ProtocolVersion::Http10),
            "1.1" => Ok(ProtocolVersion::Http11),
            "2" | "2.0" => Ok(ProtocolVersion::Http2),
            "3" | "3.0" => Ok(ProtocolVersion::Http3),
            _ => Err(DispatchError::configuration(format!("Unknown HTTP version '{}'", s))),
        }
    }
}

impl TryFrom<String> for ProtocolVersion {
    type Error = DispatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProtocolVersion> for String {
    fn from(value: ProtocolVersion) -> Self {
        value.as_str().to_string()
    }
}

/// Ordered query parameters with last-write-wins keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a literal query string such as `foo=bar&bar=foo`.
    pub fn parse(raw: &str) -> DispatchResult<Self> {
        let raw = raw.trim().trim_start_matches('?');
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw)
            .map_err(|e| DispatchError::configuration(format!("Invalid query string '{}': {}", raw, e)))?;
        Ok(pairs.into_iter().collect())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a key, replacing an existing value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    /// Merge `other` on top of `self`; `other` wins on key collision.
    pub fn merge(&mut self, other: &QueryParams) {
        for (k, v) in &other.pairs {
            self.insert(k.clone(), v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Render as a JSON object for template contexts.
    pub fn to_value(&self) -> serde_json::Value {
        self.pairs
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect::<serde_json::Map<_, _>>()
            .into()
    }
}

impl FromIterator<(String, String)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut query = QueryParams::new();
        for (k, v) in iter {
            query.insert(k, v);
        }
        query
    }
}

/// Immutable description of one outbound call.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    url: String,
    content_type: Option<ContentType>,
    version: Option<ProtocolVersion>,
    authorization: Option<String>,
    query: Option<QueryParams>,
    payload: Option<Payload>,
    cache: bool,
}

impl RequestConfig {
    /// Create a config for `url` with every option unset.
    pub fn new(url: impl Into<String>) -> DispatchResult<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(DispatchError::configuration("No url configured"));
        }
        Ok(Self {
            url,
            content_type: None,
            version: None,
            authorization: None,
            query: None,
            payload: None,
            cache: false,
        })
    }

    /// Build the config used by the proxy strategies (processor, load balancer, composition).
    pub fn for_proxy(url: &str, options: &ProxyOptions) -> DispatchResult<Self> {
        Ok(Self {
            content_type: options.content_type,
            version: options.version,
            authorization: non_empty(options.authorization.as_deref()),
            query: parse_fixed_query(options.query.as_deref())?,
            cache: options.cache,
            ..Self::new(url)?
        })
    }

    /// Build the config used by the raw strategy.
    ///
    /// The content type comes from the configured `content-type` header and
    /// falls back to text.
    pub fn for_raw(url: &str, raw: &RawActionConfig) -> DispatchResult<Self> {
        let content_type = raw
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .and_then(|(_, value)| ContentType::from_header_value(value))
            .unwrap_or(ContentType::Text);

        Ok(Self {
            content_type: Some(content_type),
            version: raw.version,
            query: parse_fixed_query(raw.query.as_deref())?,
            payload: raw.body.clone().filter(|b| !b.is_empty()).map(Payload::Text),
            cache: raw.cache,
            ..Self::new(url)?
        })
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    pub fn with_query(mut self, query: QueryParams) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Same config against another URL.
    pub fn with_url(self, url: impl Into<String>) -> DispatchResult<Self> {
        Ok(Self {
            url: Self::new(url)?.url,
            ..self
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.content_type
    }

    /// Content type with the JSON default applied.
    pub fn effective_content_type(&self) -> ContentType {
        self.content_type.unwrap_or_default()
    }

    pub fn version(&self) -> Option<ProtocolVersion> {
        self.version
    }

    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }

    pub fn query(&self) -> Option<&QueryParams> {
        self.query.as_ref()
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn should_cache(&self) -> bool {
        self.cache
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_fixed_query(raw: Option<&str>) -> DispatchResult<Option<QueryParams>> {
    match raw.map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => QueryParams::parse(q).map(Some),
        None => Ok(None),
    }
}

/// Look up a header by case-insensitive name, ignoring invalid values.
pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn test_content_type_parsing() {
        assert_eq!("json".parse::<ContentType>().unwrap(), ContentType::Json);
        assert_eq!(
            "application/x-www-form-urlencoded".parse::<ContentType>().unwrap(),
            ContentType::Form
        );
        assert_eq!(
            ContentType::from_header_value("Application/XML; charset=utf-8"),
            Some(ContentType::Xml)
        );
        assert!("image/png".parse::<ContentType>().is_err());
        assert_eq!(ContentType::default(), ContentType::Json);
    }

    #[test]
    fn test_protocol_version_parsing() {
        assert_eq!("1.1".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::Http11);
        assert_eq!("HTTP/2".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::Http2);
        assert_eq!(ProtocolVersion::Http10.to_http(), http::Version::HTTP_10);
        assert!("4.0".parse::<ProtocolVersion>().is_err());
    }

    #[test]
    fn test_query_merge_fixed_wins() {
        let mut dynamic = QueryParams::parse("foo=dynamic&page=2").unwrap();
        let fixed = QueryParams::parse("foo=fixed&limit=10").unwrap();
        dynamic.merge(&fixed);

        let pairs: Vec<_> = dynamic.iter().collect();
        assert_eq!(pairs, vec![("foo", "fixed"), ("page", "2"), ("limit", "10")]);
    }

    #[test]
    fn test_query_duplicate_keys_last_wins() {
        let query = QueryParams::parse("?a=1&a=2").unwrap();
        assert_eq!(query.len(), 1);
        assert_eq!(query.get("a"), Some("2"));
    }

    #[test]
    fn test_empty_url_rejected() {
        let err = RequestConfig::new("  ").unwrap_err();
        assert!(matches!(err, DispatchError::Configuration(_)));
    }

    #[test]
    fn test_for_proxy() {
        let options = ProxyOptions {
            content_type: Some(ContentType::Form),
            version: Some(ProtocolVersion::Http11),
            authorization: Some("  ".into()),
            query: Some("foo=bar".into()),
            cache: true,
        };
        let config = RequestConfig::for_proxy("http://127.0.0.1/foo", &options).unwrap();
        assert_eq!(config.url(), "http://127.0.0.1/foo");
        assert_eq!(config.effective_content_type(), ContentType::Form);
        assert_eq!(config.authorization(), None);
        assert_eq!(config.query().and_then(|q| q.get("foo")), Some("bar"));
        assert!(config.should_cache());
        assert!(config.payload().is_none());
    }

    #[test]
    fn test_for_raw_resolves_content_type_from_headers() {
        let mut headers = IndexMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let raw = RawActionConfig {
            url: "http://127.0.0.1".into(),
            method: "POST".into(),
            headers,
            body: Some("{\"a\":1}".into()),
            query: None,
            version: None,
            cache: false,
        };
        let config = RequestConfig::for_raw(&raw.url, &raw).unwrap();
        assert_eq!(config.content_type(), Some(ContentType::Json));

        let raw = RawActionConfig {
            headers: IndexMap::new(),
            body: Some(String::new()),
            ..raw
        };
        let config = RequestConfig::for_raw(&raw.url, &raw).unwrap();
        assert_eq!(config.content_type(), Some(ContentType::Text));
        assert!(config.payload().is_none());
    }
}
