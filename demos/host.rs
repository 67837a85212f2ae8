//! Launches a plugin binary and runs a node through it.
//!
//! ```text
//! cargo build --example echo_plugin
//! cargo run --example host -- target/debug/examples/echo_plugin
//! ```

use std::{
    io::{BufRead, BufReader},
    process::{Command, Stdio},
};

use flowplug::{Config, ExecutionContext, Node, NodeBuilder, NodeExecutor, PluginClient, PluginError, Result, StaticTransport};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args().nth(1).ok_or_else(|| PluginError::Config("usage: host <plugin-binary>".to_string()))?;
    let config = Config::default();

    let mut plugin = Command::new(&path)
        .env(&config.handshake.magic_cookie_key, &config.handshake.magic_cookie_value)
        .stdout(Stdio::piped())
        .spawn()?;

    let stdout = plugin.stdout.take().ok_or_else(|| PluginError::IoError("plugin stdout is not captured".to_string()))?;
    let mut line = String::new();
    BufReader::new(stdout).read_line(&mut line)?;
    println!("handshake: {}", line.trim());

    let client = PluginClient::connect(&StaticTransport::from_line(&line)?, &config).await?;
    println!("capabilities: {:?}", client.get_capabilities().await?);

    let node = NodeBuilder::new("greet", "upper").with("text", "hello from the host").step(Node::new("greet.log", "echo")).build()?;
    let result = client.execute(node, ExecutionContext::new().with_current_item(json!({"n": 1}))).await?;
    println!("result: {}", result);

    let failed = client.execute(Node::new("bad", "http.get"), ExecutionContext::new()).await;
    println!("unsupported node: {:?}", failed.err());

    plugin.kill()?;
    Ok(())
}
