use serde_json::Value;
use tokio::runtime::{Builder, Runtime};

use crate::{
    Config, Result,
    model::{ExecutionContext, Node},
    service::{CallOptions, PluginClient},
    transport::TransportFactory,
};

/// Blocking facade over [`PluginClient`] for hosts that do not run tokio.
///
/// Owns a one-worker runtime, so the connection keeps making progress between
/// calls and the client from [`BlockingPluginClient::client`] works on any
/// runtime. Every call blocks the calling thread until the plugin answers or
/// the call is bounded by its deadline or cancellation.
pub struct BlockingPluginClient {
    client: PluginClient,
    rt: Runtime,
}

impl BlockingPluginClient {
    pub fn connect(
        factory: &dyn TransportFactory,
        config: &Config,
    ) -> Result<Self> {
        let rt = Builder::new_multi_thread().worker_threads(1).enable_all().build()?;
        let client = rt.block_on(PluginClient::connect(factory, config))?;

        Ok(Self {
            client,
            rt,
        })
    }

    pub fn execute(
        &self,
        node: &Node,
        ctx: &ExecutionContext,
    ) -> Result<Value> {
        self.rt.block_on(self.client.execute_with(node, ctx, self.client.default_options()))
    }

    pub fn execute_with(
        &self,
        node: &Node,
        ctx: &ExecutionContext,
        options: &CallOptions,
    ) -> Result<Value> {
        self.rt.block_on(self.client.execute_with(node, ctx, options))
    }

    pub fn get_capabilities(&self) -> Result<Vec<String>> {
        self.rt.block_on(self.client.capabilities_with(self.client.default_options()))
    }

    /// The async client, sharing this client's connection.
    pub fn client(&self) -> PluginClient {
        self.client.clone()
    }
}
