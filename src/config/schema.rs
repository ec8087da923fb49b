//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine
//! and its host shell. All types derive Serde traits for deserialization
//! from TOML files.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dispatch::request_config::{ContentType, ProtocolVersion};

/// Methods accepted by the raw strategy.
pub const RAW_METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Listener configuration for the host shell.
    pub listener: ListenerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Shared response cache.
    pub cache: CacheConfig,

    /// Named, reusable upstream connections.
    pub connections: Vec<ConnectionSettings>,

    /// Actions exposed by the host.
    pub actions: Vec<ActionConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum inbound body size in bytes.
    pub max_body_bytes: usize,

    /// Total time allowed for one inbound call in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cache keys held in memory.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: 10_000 }
    }
}

/// Named HTTP connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionSettings {
    pub name: String,

    /// Base URL relative action URLs are resolved against.
    #[serde(default)]
    pub url: Option<String>,

    /// Basic-auth user name.
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Outbound proxy URL.
    #[serde(default)]
    pub proxy: Option<String>,

    /// Verify upstream TLS certificates (default: true).
    #[serde(default = "default_true")]
    pub verify_tls: bool,

    /// Protocol version used when an action sets none.
    #[serde(default)]
    pub version: Option<ProtocolVersion>,

    /// Request timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Headers sent with every request.
    #[serde(default)]
    pub headers: IndexMap<String, String>,

    /// Cache responses of every action using this connection.
    #[serde(default)]
    pub cache: bool,
}

impl ConnectionSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
            username: None,
            password: None,
            proxy: None,
            verify_tls: true,
            version: None,
            timeout_secs: None,
            headers: IndexMap::new(),
            cache: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// One action: a route bound to a dispatch strategy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionConfig {
    /// Action identifier for logging/metrics.
    pub name: String,

    /// Route pattern with `:name` segments (e.g. "/users/:id").
    pub path: String,

    /// Accepted methods; empty accepts any.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,

    /// Sent as `x-fusio-operation-id`; defaults to the action name.
    #[serde(default)]
    pub operation_id: Option<String>,

    /// Named connection to dispatch through.
    #[serde(default)]
    pub connection: Option<String>,

    pub strategy: StrategyConfig,
}

impl ActionConfig {
    pub fn operation_id(&self) -> &str {
        self.operation_id.as_deref().unwrap_or(&self.name)
    }
}

/// Dispatch strategy of an action.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Forward to a single URL.
    Processor {
        #[serde(default)]
        url: String,
        #[serde(flatten)]
        options: ProxyOptions,
    },

    /// Forward to one URL picked uniformly at random.
    LoadBalancer {
        #[serde(default)]
        urls: Vec<String>,
        #[serde(flatten)]
        options: ProxyOptions,
    },

    /// Call every URL and merge the bodies keyed by URL.
    Composition {
        #[serde(default)]
        urls: Vec<String>,
        #[serde(flatten)]
        options: ProxyOptions,
    },

    /// Fully templated request.
    Raw(RawActionConfig),
}

impl StrategyConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            StrategyConfig::Processor { .. } => "processor",
            StrategyConfig::LoadBalancer { .. } => "load_balancer",
            StrategyConfig::Composition { .. } => "composition",
            StrategyConfig::Raw(_) => "raw",
        }
    }
}

/// Options shared by the forwarding strategies.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyOptions {
    /// Outbound content type (default: json).
    pub content_type: Option<ContentType>,

    pub version: Option<ProtocolVersion>,

    /// Sent as `authorization`, replacing any inbound credential.
    pub authorization: Option<String>,

    /// Fixed query string merged over the inbound query.
    pub query: Option<String>,

    pub cache: bool,
}

/// Raw strategy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawActionConfig {
    #[serde(default)]
    pub url: String,

    /// One of GET, POST, PUT, PATCH, DELETE.
    #[serde(default = "default_raw_method")]
    pub method: String,

    /// Outbound headers; inbound headers are never forwarded.
    #[serde(default)]
    pub headers: IndexMap<String, String>,

    /// Body template.
    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub query: Option<String>,

    #[serde(default)]
    pub version: Option<ProtocolVersion>,

    #[serde(default)]
    pub cache: bool,
}

impl RawActionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_raw_method(),
            headers: IndexMap::new(),
            body: None,
            query: None,
            version: None,
            cache: false,
        }
    }
}

fn default_raw_method() -> String {
    "GET".to_string()
}
