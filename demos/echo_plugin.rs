//! A plugin answering `echo` and `upper` nodes.
//!
//! Must be launched by a host (see `demos/host.rs`), which sets the magic
//! cookie and reads the handshake line from stdout.

use async_trait::async_trait;
use flowplug::{Config, ExecutionContext, HandshakeConfig, Node, NodeExecutor, PluginError, PluginServer, Result};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

struct EchoPlugin;

#[async_trait]
impl NodeExecutor for EchoPlugin {
    async fn execute(
        &self,
        node: Node,
        ctx: ExecutionContext,
    ) -> Result<Value> {
        match node.uses.as_str() {
            "echo" => Ok(json!({
                "id": node.id,
                "with": node.with,
                "item": ctx.current_item,
            })),
            "upper" => {
                let text = node.with.get("text").and_then(Value::as_str).ok_or_else(|| PluginError::Execution("'text' parameter is required".to_string()))?;
                Ok(Value::String(text.to_uppercase()))
            }
            other => Err(PluginError::Execution(format!("unsupported capability '{}'", other))),
        }
    }

    async fn get_capabilities(&self) -> Result<Vec<String>> {
        Ok(vec!["echo".to_string(), "upper".to_string()])
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout is reserved for the handshake line
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();

    let config = Config::default();
    PluginServer::new(EchoPlugin, HandshakeConfig::default()).serve(&config).await
}
