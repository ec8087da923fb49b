//! Uniform random endpoint selection.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;

use crate::connection::Connection;
use crate::dispatch::context::{CallContext, InboundRequest};
use crate::dispatch::error::{DispatchError, DispatchResult};
use crate::dispatch::request_config::RequestConfig;
use crate::dispatch::response::NormalizedResponse;
use crate::dispatch::sender::Sender;
use crate::strategy::proxy::ProxyExtractor;
use crate::strategy::Action;

/// Forwards each call to one URL drawn uniformly at random.
///
/// Every call is an independent draw: no affinity, no weighting.
pub struct LoadBalancer {
    sender: Sender,
    configs: Vec<RequestConfig>,
    connection: Option<Arc<Connection>>,
}

impl LoadBalancer {
    pub fn new(
        sender: Sender,
        configs: Vec<RequestConfig>,
        connection: Option<Arc<Connection>>,
    ) -> DispatchResult<Self> {
        if configs.is_empty() {
            return Err(DispatchError::configuration("No urls configured"));
        }
        Ok(Self {
            sender,
            configs,
            connection,
        })
    }
}

#[async_trait]
impl Action for LoadBalancer {
    fn name(&self) -> &'static str {
        "load_balancer"
    }

    async fn handle(&self, request: &InboundRequest, context: &CallContext) -> DispatchResult<NormalizedResponse> {
        let index = rand::thread_rng().gen_range(0..self.configs.len());
        let config = &self.configs[index];
        tracing::debug!(url = %config.url(), index = index, "Selected upstream");

        self.sender
            .send(config, request, context, &ProxyExtractor, self.connection.as_deref())
            .await
    }
}
