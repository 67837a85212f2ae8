//! Where a plugin can be reached.
//!
//! Launching the plugin process is up to the host. The core only asks a
//! [`TransportFactory`] for the handshake line of a plugin that is ready to
//! accept connections, so it never assumes who started the plugin.

use async_trait::async_trait;

use crate::{
    Result,
    handshake::{HandshakeConfig, HandshakeLine},
};

#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Returns the handshake line of a plugin that is ready to accept connections.
    async fn establish(
        &self,
        handshake: &HandshakeConfig,
    ) -> Result<HandshakeLine>;
}

/// A plugin whose handshake line is already known to the host.
#[derive(Debug, Clone)]
pub struct StaticTransport {
    line: Option<HandshakeLine>,
    address: String,
}

impl StaticTransport {
    /// Plugin listening with gRPC on a TCP address. The protocol version is
    /// taken from the host's handshake config and verified on every call.
    pub fn tcp(address: impl Into<String>) -> Self {
        Self {
            line: None,
            address: address.into(),
        }
    }

    /// Plugin that announced itself with `line`, usually read from its stdout.
    pub fn from_line(line: &str) -> Result<Self> {
        let line = HandshakeLine::parse(line)?;
        Ok(Self {
            address: line.address.clone(),
            line: Some(line),
        })
    }
}

#[async_trait]
impl TransportFactory for StaticTransport {
    async fn establish(
        &self,
        handshake: &HandshakeConfig,
    ) -> Result<HandshakeLine> {
        match &self.line {
            Some(line) => Ok(line.clone()),
            None => Ok(HandshakeLine::grpc_tcp(handshake.protocol_version, self.address.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::Protocol;

    #[tokio::test]
    async fn test_tcp_uses_host_version() {
        let handshake = HandshakeConfig {
            protocol_version: 4,
            ..Default::default()
        };
        let line = StaticTransport::tcp("127.0.0.1:9000").establish(&handshake).await.unwrap();
        assert_eq!(line, HandshakeLine::grpc_tcp(4, "127.0.0.1:9000"));
    }

    #[tokio::test]
    async fn test_from_line_keeps_announced_values() {
        let transport = StaticTransport::from_line("1|3|tcp|127.0.0.1:9000|netrpc").unwrap();
        let line = transport.establish(&HandshakeConfig::default()).await.unwrap();
        assert_eq!(line.app_version, 3);
        assert_eq!(line.protocol, Protocol::NetRpc);
    }
}
