//! Named upstream connections.
//!
//! # Responsibilities
//! - Build preconfigured transports from host-managed settings
//! - Resolve connections by name for actions
//! - Check upstream reachability
//!
//! # Design Decisions
//! - Connections are built once per configuration load and shared via Arc
//! - The engine never mutates connection settings

pub mod factory;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::{HeaderMap, Method};
use url::Url;

use crate::config::schema::ConnectionSettings;
use crate::dispatch::error::{DispatchError, DispatchResult};
use crate::dispatch::request_config::ProtocolVersion;
use crate::transport::{HttpTransport, OutboundBody, OutboundRequest};

pub use factory::ConnectionFactory;

/// A ready-to-use connection.
#[derive(Clone)]
pub struct Connection {
    pub name: String,
    /// Base URL relative action URLs are resolved against.
    pub base_url: Option<Url>,
    pub transport: Arc<dyn HttpTransport>,
    /// Default protocol version.
    pub version: Option<ProtocolVersion>,
    /// Cache every call made through this connection.
    pub cache: bool,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("version", &self.version)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// `HEAD /` against the base URL; healthy iff the upstream answers 2xx.
    pub async fn ping(&self) -> DispatchResult<bool> {
        let base = self.base_url.as_ref().ok_or_else(|| {
            DispatchError::configuration(format!("Connection '{}' has no url to ping", self.name))
        })?;
        let url = base
            .join("/")
            .map_err(|e| DispatchError::configuration(format!("Invalid ping url: {}", e)))?;

        let request = OutboundRequest {
            method: Method::HEAD,
            url,
            headers: HeaderMap::new(),
            body: OutboundBody::Empty,
            version: self.version,
        };

        match self.transport.execute(request).await {
            Ok(response) => Ok(response.status.is_success()),
            Err(e) => {
                tracing::warn!(connection = %self.name, error = %e, "Connection ping failed");
                Ok(false)
            }
        }
    }
}

/// Connections by name.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<String, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn from_settings(settings: &[ConnectionSettings], factory: &ConnectionFactory) -> DispatchResult<Self> {
        let mut registry = Self::default();
        for s in settings {
            registry.insert(factory.build(s)?);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, connection: Connection) {
        self.connections
            .insert(connection.name.clone(), Arc::new(connection));
    }

    pub fn get(&self, name: &str) -> DispatchResult<Arc<Connection>> {
        self.connections
            .get(name)
            .cloned()
            .ok_or_else(|| DispatchError::configuration(format!("Unknown connection '{}'", name)))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
