//! Single endpoint strategy.

use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::Connection;
use crate::dispatch::context::{CallContext, InboundRequest};
use crate::dispatch::error::DispatchResult;
use crate::dispatch::request_config::RequestConfig;
use crate::dispatch::response::NormalizedResponse;
use crate::dispatch::sender::Sender;
use crate::strategy::proxy::ProxyExtractor;
use crate::strategy::Action;

/// Forwards every call to one configured URL.
pub struct Processor {
    sender: Sender,
    config: RequestConfig,
    connection: Option<Arc<Connection>>,
}

impl Processor {
    pub fn new(sender: Sender, config: RequestConfig, connection: Option<Arc<Connection>>) -> Self {
        Self {
            sender,
            config,
            connection,
        }
    }
}

#[async_trait]
impl Action for Processor {
    fn name(&self) -> &'static str {
        "processor"
    }

    async fn handle(&self, request: &InboundRequest, context: &CallContext) -> DispatchResult<NormalizedResponse> {
        self.sender
            .send(
                &self.config,
                request,
                context,
                &ProxyExtractor,
                self.connection.as_deref(),
            )
            .await
    }
}
