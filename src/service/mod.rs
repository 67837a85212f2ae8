//! The `NodeExecutor` capability set and its gRPC adapters.
//!
//! [`PluginClient`] is the host-side proxy, [`PluginServer`] dispatches calls
//! received by a plugin into a local [`NodeExecutor`]. Both sides are stateless
//! between calls.

mod blocking;
mod client;
mod server;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    Result,
    model::{ExecutionContext, Node},
};

pub use blocking::BlockingPluginClient;
pub use client::PluginClient;
pub use server::{Dispatcher, PluginServer};

/// What a plugin implements.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Executes a node and returns its result.
    ///
    /// # Arguments
    ///
    /// * `node` - The [`Node`] to execute, with its sub-workflows.
    /// * `ctx` - The [`ExecutionContext`] of this run.
    ///
    /// # Returns
    ///
    /// Returns the result of the node as a [`Value`], `Value::Null` for none.
    async fn execute(
        &self,
        node: Node,
        ctx: ExecutionContext,
    ) -> Result<Value>;

    /// Returns the `uses` values this executor can run, in declaration order.
    async fn get_capabilities(&self) -> Result<Vec<String>>;
}

/// Per-call limits on how long the caller waits.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// deadline for the call, unbounded when `None`
    pub timeout: Option<Duration>,
    /// aborts the call when cancelled
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(
        mut self,
        cancel: CancellationToken,
    ) -> Self {
        self.cancel = Some(cancel);
        self
    }
}
