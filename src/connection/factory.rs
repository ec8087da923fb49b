//! Builds transports from named connection settings.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::config::schema::ConnectionSettings;
use crate::connection::Connection;
use crate::dispatch::error::{DispatchError, DispatchResult};
use crate::dispatch::rewrite::{headers_from_config, USER_AGENT_VALUE};
use crate::transport::client::{Credentials, ReqwestTransport};

/// Turns [`ConnectionSettings`] into ready-to-use [`Connection`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionFactory;

impl ConnectionFactory {
    pub fn build(&self, settings: &ConnectionSettings) -> DispatchResult<Connection> {
        let base_url = settings
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(|u| {
                Url::parse(u).map_err(|e| {
                    DispatchError::configuration(format!(
                        "Connection '{}' has an invalid url '{}': {}",
                        settings.name, u, e
                    ))
                })
            })
            .transpose()?;

        let client = self.client(settings)?;
        let mut transport = ReqwestTransport::new(client);
        if let Some(username) = settings.username.as_deref().filter(|u| !u.is_empty()) {
            transport = transport.with_credentials(Credentials {
                username: username.to_string(),
                password: settings.password.clone().unwrap_or_default(),
            });
        }

        tracing::debug!(
            connection = %settings.name,
            base_url = ?base_url.as_ref().map(Url::as_str),
            cache = settings.cache,
            "Built connection"
        );

        Ok(Connection {
            name: settings.name.clone(),
            base_url,
            transport: Arc::new(transport),
            version: settings.version,
            cache: settings.cache,
        })
    }

    fn client(&self, settings: &ConnectionSettings) -> DispatchResult<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT_VALUE);

        if let Some(proxy) = settings.proxy.as_deref().filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| {
                DispatchError::configuration(format!(
                    "Connection '{}' has an invalid proxy: {}",
                    settings.name, e
                ))
            })?;
            builder = builder.proxy(proxy);
        }
        if !settings.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(timeout) = settings.timeout_secs.filter(|t| *t > 0) {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        if !settings.headers.is_empty() {
            builder = builder.default_headers(headers_from_config(&settings.headers)?);
        }

        builder.build().map_err(|e| {
            DispatchError::configuration(format!(
                "Connection '{}' could not be built: {}",
                settings.name, e
            ))
        })
    }
}
