//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (actions reference existing connections)
//! - Validate URLs, methods and route patterns
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use http::Method;
use thiserror::Error;
use url::Url;

use crate::config::schema::{EngineConfig, StrategyConfig, RAW_METHODS};
use crate::dispatch::request_config::ContentType;
use crate::routing::RoutePattern;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted location of the offending value.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "must be a socket address"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "must be a socket address"));
    }

    let mut connection_names = HashSet::new();
    for (i, connection) in config.connections.iter().enumerate() {
        let field = format!("connections[{}]", i);
        if connection.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.name", field), "must not be empty"));
        } else if !connection_names.insert(connection.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate connection '{}'", connection.name),
            ));
        }
        for (key, value) in [("url", &connection.url), ("proxy", &connection.proxy)] {
            if let Some(value) = value {
                if Url::parse(value).is_err() {
                    errors.push(ValidationError::new(format!("{}.{}", field, key), "must be an absolute URL"));
                }
            }
        }
    }

    let mut action_names = HashSet::new();
    for (i, action) in config.actions.iter().enumerate() {
        let field = format!("actions[{}]", i);
        if action.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.name", field), "must not be empty"));
        } else if !action_names.insert(action.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate action '{}'", action.name),
            ));
        }

        if let Err(e) = RoutePattern::parse(&action.path) {
            errors.push(ValidationError::new(format!("{}.path", field), e.to_string()));
        }
        for method in &action.methods {
            if method.parse::<Method>().is_err() {
                errors.push(ValidationError::new(
                    format!("{}.methods", field),
                    format!("invalid method '{}'", method),
                ));
            }
        }
        if let Some(connection) = &action.connection {
            if !connection_names.contains(connection.as_str()) {
                errors.push(ValidationError::new(
                    format!("{}.connection", field),
                    format!("unknown connection '{}'", connection),
                ));
            }
        }

        validate_strategy(&format!("{}.strategy", field), &action.strategy, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_strategy(field: &str, strategy: &StrategyConfig, errors: &mut Vec<ValidationError>) {
    match strategy {
        StrategyConfig::Processor { url, .. } => {
            if url.trim().is_empty() {
                errors.push(ValidationError::new(format!("{}.url", field), "must not be empty"));
            }
        }
        StrategyConfig::LoadBalancer { urls, .. } | StrategyConfig::Composition { urls, .. } => {
            if urls.is_empty() {
                errors.push(ValidationError::new(format!("{}.urls", field), "must not be empty"));
            }
            for (i, url) in urls.iter().enumerate() {
                if url.trim().is_empty() {
                    errors.push(ValidationError::new(format!("{}.urls[{}]", field, i), "must not be empty"));
                }
            }
        }
        StrategyConfig::Raw(raw) => {
            if raw.url.trim().is_empty() {
                errors.push(ValidationError::new(format!("{}.url", field), "must not be empty"));
            }
            if !RAW_METHODS.contains(&raw.method.to_ascii_uppercase().as_str()) {
                errors.push(ValidationError::new(
                    format!("{}.method", field),
                    format!("'{}' is not one of {}", raw.method, RAW_METHODS.join(", ")),
                ));
            }
            let multipart = raw.headers.iter().any(|(name, value)| {
                name.eq_ignore_ascii_case("content-type")
                    && ContentType::from_header_value(value) == Some(ContentType::Multipart)
            });
            if multipart {
                errors.push(ValidationError::new(
                    format!("{}.headers", field),
                    "raw actions cannot send multipart bodies",
                ));
            }
        }
    }
}
