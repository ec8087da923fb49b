//! Dispatch strategies.
//!
//! # Data Flow
//! ```text
//! ActionConfig.strategy
//!     → build_action (RequestConfig per URL, resolved connection)
//!     → processor.rs     single URL
//!     → load_balancer.rs one random URL per call
//!     → composition.rs   every URL, merged by URL
//!     → raw.rs           templated request
//!     → Sender (shared pipeline)
//! ```
//!
//! # Design Decisions
//! - Strategies are small adapters over `Sender`, each with its own `RequestExtractor`
//! - No strategy keeps state between calls
//! - Configuration faults are caught when the action is built, before traffic

pub mod composition;
pub mod load_balancer;
pub mod processor;
pub mod proxy;
pub mod raw;
pub mod template;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::schema::{ActionConfig, ProxyOptions, StrategyConfig};
use crate::connection::ConnectionRegistry;
use crate::dispatch::context::{CallContext, InboundRequest};
use crate::dispatch::error::DispatchResult;
use crate::dispatch::request_config::RequestConfig;
use crate::dispatch::response::NormalizedResponse;
use crate::dispatch::sender::Sender;

pub use composition::Composition;
pub use load_balancer::LoadBalancer;
pub use processor::Processor;
pub use proxy::ProxyExtractor;
pub use raw::RawAction;
pub use template::{JinjaTemplate, TemplateRenderer};

/// An invocable action.
#[async_trait]
pub trait Action: Send + Sync {
    /// Strategy label used in logs and metrics.
    fn name(&self) -> &'static str;

    async fn handle(&self, request: &InboundRequest, context: &CallContext) -> DispatchResult<NormalizedResponse>;
}

/// Build the action described by `config`.
pub fn build_action(
    config: &ActionConfig,
    sender: &Sender,
    connections: &ConnectionRegistry,
) -> DispatchResult<Arc<dyn Action>> {
    let connection = config
        .connection
        .as_deref()
        .map(|name| connections.get(name))
        .transpose()?;
    let sender = sender.clone();

    let action: Arc<dyn Action> = match &config.strategy {
        StrategyConfig::Processor { url, options } => Arc::new(Processor::new(
            sender,
            RequestConfig::for_proxy(url, options)?,
            connection,
        )),
        StrategyConfig::LoadBalancer { urls, options } => Arc::new(LoadBalancer::new(
            sender,
            proxy_configs(urls, options)?,
            connection,
        )?),
        StrategyConfig::Composition { urls, options } => Arc::new(Composition::new(
            sender,
            proxy_configs(urls, options)?,
            connection,
        )?),
        StrategyConfig::Raw(raw) => Arc::new(RawAction::new(sender, raw, connection)?),
    };
    Ok(action)
}

fn proxy_configs(urls: &[String], options: &ProxyOptions) -> DispatchResult<Vec<RequestConfig>> {
    urls.iter()
        .map(|url| RequestConfig::for_proxy(url, options))
        .collect()
}
