//! Call context consumed from the host.
//!
//! Identity resolution happens in the host; the engine only reads the
//! resolved values. The client IP is an explicit field, not an ambient
//! lookup.

use std::net::{IpAddr, Ipv4Addr};

use http::{HeaderMap, Method};
use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::dispatch::payload::Payload;
use crate::dispatch::request_config::QueryParams;

/// Caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
    pub name: String,
    pub anonymous: bool,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            anonymous: false,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            anonymous: true,
        }
    }
}

/// Calling application identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub id: String,
    pub app_key: String,
    pub anonymous: bool,
}

impl AppIdentity {
    pub fn new(id: impl Into<String>, app_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            app_key: app_key.into(),
            anonymous: false,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            id: String::new(),
            app_key: String::new(),
            anonymous: true,
        }
    }
}

/// Everything the host knows about the caller of one inbound call.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub operation_id: String,
    pub user: UserIdentity,
    pub app: AppIdentity,
    /// Observed client IP; `None` when the host could not determine it.
    pub client_ip: Option<IpAddr>,
}

impl CallContext {
    /// Anonymous caller for the given operation.
    pub fn anonymous(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            user: UserIdentity::anonymous(),
            app: AppIdentity::anonymous(),
            client_ip: None,
        }
    }

    pub fn with_user(mut self, user: UserIdentity) -> Self {
        self.user = user;
        self
    }

    pub fn with_app(mut self, app: AppIdentity) -> Self {
        self.app = app;
        self
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Client IP with the loopback default applied.
    pub fn remote_ip(&self) -> IpAddr {
        self.client_ip.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    /// Identity projection exposed to templates.
    pub fn to_value(&self) -> Value {
        let user = if self.user.anonymous {
            json!({ "anonymous": true })
        } else {
            json!({ "id": self.user.id, "name": self.user.name, "anonymous": false })
        };
        let app = if self.app.anonymous {
            json!({ "anonymous": true })
        } else {
            json!({ "id": self.app.id, "appKey": self.app.app_key, "anonymous": false })
        };
        json!({
            "operationId": self.operation_id,
            "user": user,
            "app": app,
        })
    }
}

/// HTTP side of an inbound call.
#[derive(Debug, Clone)]
pub struct HttpRequestContext {
    pub method: Method,
    /// Named path parameters captured by the host's route match.
    pub path_params: IndexMap<String, String>,
    pub query: QueryParams,
    pub headers: HeaderMap,
}

impl HttpRequestContext {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            path_params: IndexMap::new(),
            query: QueryParams::new(),
            headers: HeaderMap::new(),
        }
    }
}

/// An inbound API call as handed over by the host.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// Present when the call arrived over HTTP; absent for scheduled or CLI triggers.
    pub http: Option<HttpRequestContext>,
    /// Named arguments resolved by the host.
    pub arguments: IndexMap<String, String>,
    pub payload: Option<Payload>,
}

impl InboundRequest {
    pub fn http(context: HttpRequestContext) -> Self {
        Self {
            http: Some(context),
            ..Self::default()
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    pub fn path_params(&self) -> Option<&IndexMap<String, String>> {
        self.http.as_ref().map(|h| &h.path_params)
    }
}
