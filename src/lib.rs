//! # Flowplug
//!
//! Flowplug runs a single workflow node in a separate plugin process and
//! brings its result back to the host engine over gRPC.
//!
//! ## Core Features
//!
//! - **Recursive node model**: `Node` trees with `do` and `on_failure` sub-workflows
//! - **Hybrid wire codec**: structural fields travel as protobuf, dynamic payloads as JSON blobs
//! - **Symmetric adapters**: `PluginClient` on the host, `PluginServer` in the plugin
//! - **Version-checked handshake**: mismatched plugins are rejected before any node runs
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flowplug::{Config, ExecutionContext, NodeBuilder, NodeExecutor, PluginClient, StaticTransport};
//!
//! let config = Config::default();
//! let client = PluginClient::connect(&StaticTransport::from_line(line)?, &config).await?;
//!
//! let node = NodeBuilder::new("fetch", "http.get").with("url", "https://example.com").build()?;
//! let result = client.execute(node, ExecutionContext::new()).await?;
//! ```

pub mod codec;
mod config;
mod error;
pub mod handshake;
mod model;
mod service;
mod transport;

pub mod pb {
    tonic::include_proto!("nodeexecutor");
}

pub use config::{ClientConfig, Config, ServerConfig};
pub use error::PluginError;
pub use handshake::{HandshakeConfig, HandshakeLine};
pub use model::*;
pub use service::{BlockingPluginClient, CallOptions, Dispatcher, NodeExecutor, PluginClient, PluginServer};
pub use tokio_util::sync::CancellationToken;
pub use transport::{StaticTransport, TransportFactory};

/// Result type alias for flowplug operations.
pub type Result<T> = std::result::Result<T, PluginError>;
