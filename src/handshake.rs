//! Handshake between host and plugin.
//!
//! A plugin refuses to serve unless it was started with the magic cookie in its
//! environment, then announces where it listens with a handshake line on stdout:
//!
//! ```text
//! CORE-PROTOCOL-VERSION | APP-PROTOCOL-VERSION | NETWORK | ADDRESS | PROTOCOL
//! 1|1|tcp|127.0.0.1:40123|grpc
//! ```
//!
//! Once connected, every call carries the handshake triple as request metadata
//! and the plugin rejects calls whose triple does not match its own.

use std::{fmt, str::FromStr};

use serde::Deserialize;
use tonic::{
    Code, Request, Status,
    metadata::{Ascii, MetadataMap, MetadataValue},
    service::Interceptor,
};
use tracing::{trace, warn};

use crate::{PluginError, Result};

/// Version of the handshake line format itself.
pub const CORE_PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_MAGIC_COOKIE_KEY: &str = "ORKESTRA_PLUGIN";
pub const DEFAULT_MAGIC_COOKIE_VALUE: &str = "hello";

const PROTOCOL_VERSION_HEADER: &str = "x-plugin-protocol-version";
const MAGIC_KEY_HEADER: &str = "x-plugin-magic-key";
const MAGIC_VALUE_HEADER: &str = "x-plugin-magic-value";
// set by the guard on its rejections, tells them apart from executor failures
const REJECTION_HEADER: &str = "x-plugin-handshake";
const REJECTED: &str = "rejected";

/// The `(protocol version, magic key, magic value)` triple both ends must share.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// application protocol version
    pub protocol_version: u32,
    /// environment variable the host sets when launching a plugin
    pub magic_cookie_key: String,
    /// expected value of `magic_cookie_key`
    pub magic_cookie_value: String,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            magic_cookie_key: DEFAULT_MAGIC_COOKIE_KEY.to_string(),
            magic_cookie_value: DEFAULT_MAGIC_COOKIE_VALUE.to_string(),
        }
    }
}

impl HandshakeConfig {
    /// Checks the magic cookie the plugin was launched with.
    pub fn verify_cookie(
        &self,
        value: Option<&str>,
    ) -> Result<()> {
        match value {
            Some(value) if value == self.magic_cookie_value => Ok(()),
            Some(_) => Err(PluginError::IncompatibleVersion(format!("magic cookie '{}' does not match", self.magic_cookie_key))),
            None => Err(PluginError::IncompatibleVersion(format!(
                "magic cookie '{}' is not set, this binary is a plugin and must be launched by its host",
                self.magic_cookie_key
            ))),
        }
    }

    /// Checks the magic cookie from the process environment.
    pub fn verify_env(&self) -> Result<()> {
        let value = std::env::var(&self.magic_cookie_key).ok();
        self.verify_cookie(value.as_deref())
    }

    /// Checks a handshake line announced by a plugin.
    pub fn verify_line(
        &self,
        line: &HandshakeLine,
    ) -> Result<()> {
        if line.protocol != Protocol::Grpc {
            return Err(PluginError::UnsupportedTransport(format!("protocol '{}' is not supported, only 'grpc' is", line.protocol.as_ref())));
        }
        if line.network != Network::Tcp {
            return Err(PluginError::UnsupportedTransport(format!("network '{}' is not supported, only 'tcp' is", line.network.as_ref())));
        }
        if line.core_version != CORE_PROTOCOL_VERSION {
            return Err(PluginError::IncompatibleVersion(format!(
                "core protocol version {} is not supported, expected {}",
                line.core_version, CORE_PROTOCOL_VERSION
            )));
        }
        if line.app_version != self.protocol_version {
            return Err(PluginError::IncompatibleVersion(format!(
                "plugin speaks protocol version {}, host expects {}",
                line.app_version, self.protocol_version
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Network {
    Tcp,
    Unix,
}

/// Wire protocol announced by a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    Grpc,
    /// legacy unstructured transport, always rejected
    NetRpc,
}

/// Parsed handshake line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeLine {
    pub core_version: u32,
    pub app_version: u32,
    pub network: Network,
    pub address: String,
    pub protocol: Protocol,
}

impl HandshakeLine {
    /// Line announcing a gRPC plugin listening on a TCP address.
    pub fn grpc_tcp(
        app_version: u32,
        address: impl Into<String>,
    ) -> Self {
        Self {
            core_version: CORE_PROTOCOL_VERSION,
            app_version,
            network: Network::Tcp,
            address: address.into(),
            protocol: Protocol::Grpc,
        }
    }

    pub fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.trim().split('|').collect();
        if parts.len() < 4 {
            return Err(PluginError::IncompatibleVersion(format!("unrecognized handshake line: '{}'", line.trim())));
        }

        let core_version =
            parts[0].parse::<u32>().map_err(|e| PluginError::IncompatibleVersion(format!("invalid core protocol version '{}': {}", parts[0], e)))?;
        let app_version =
            parts[1].parse::<u32>().map_err(|e| PluginError::IncompatibleVersion(format!("invalid app protocol version '{}': {}", parts[1], e)))?;
        let network = Network::from_str(parts[2]).map_err(|_| PluginError::UnsupportedTransport(format!("unknown network '{}'", parts[2])))?;
        // lines without a protocol field come from legacy netrpc plugins
        let protocol = match parts.get(4) {
            Some(p) => Protocol::from_str(p).map_err(|_| PluginError::UnsupportedTransport(format!("unknown protocol '{}'", p)))?,
            None => Protocol::NetRpc,
        };

        Ok(Self {
            core_version,
            app_version,
            network,
            address: parts[3].to_string(),
            protocol,
        })
    }
}

impl FromStr for HandshakeLine {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for HandshakeLine {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}|{}|{}|{}|{}", self.core_version, self.app_version, self.network.as_ref(), self.address, self.protocol.as_ref())
    }
}

/// Client-side interceptor stamping the handshake triple on every call.
#[derive(Clone)]
pub struct HandshakeStamp {
    version: MetadataValue<Ascii>,
    key: MetadataValue<Ascii>,
    value: MetadataValue<Ascii>,
}

impl HandshakeStamp {
    pub fn new(config: &HandshakeConfig) -> Result<Self> {
        Ok(Self {
            version: ascii(&config.protocol_version.to_string(), "protocol_version")?,
            key: ascii(&config.magic_cookie_key, "magic_cookie_key")?,
            value: ascii(&config.magic_cookie_value, "magic_cookie_value")?,
        })
    }
}

impl Interceptor for HandshakeStamp {
    fn call(
        &mut self,
        mut request: Request<()>,
    ) -> std::result::Result<Request<()>, Status> {
        let metadata = request.metadata_mut();
        metadata.insert(PROTOCOL_VERSION_HEADER, self.version.clone());
        metadata.insert(MAGIC_KEY_HEADER, self.key.clone());
        metadata.insert(MAGIC_VALUE_HEADER, self.value.clone());
        Ok(request)
    }
}

/// Server-side interceptor rejecting calls whose handshake triple does not match.
#[derive(Debug, Clone)]
pub struct HandshakeGuard {
    config: HandshakeConfig,
}

impl HandshakeGuard {
    pub fn new(config: HandshakeConfig) -> Self {
        Self {
            config,
        }
    }

    fn check(
        &self,
        request: &Request<()>,
    ) -> std::result::Result<(), String> {
        let metadata = request.metadata();
        let header = |name: &str| metadata.get(name).and_then(|v| v.to_str().ok());

        let version = header(PROTOCOL_VERSION_HEADER).ok_or("missing protocol version")?;
        if version.parse::<u32>().ok() != Some(self.config.protocol_version) {
            return Err(format!("protocol version {} does not match {}", version, self.config.protocol_version));
        }
        if header(MAGIC_KEY_HEADER) != Some(self.config.magic_cookie_key.as_str()) || header(MAGIC_VALUE_HEADER) != Some(self.config.magic_cookie_value.as_str()) {
            return Err("magic cookie does not match".to_string());
        }
        Ok(())
    }
}

impl Interceptor for HandshakeGuard {
    fn call(
        &mut self,
        request: Request<()>,
    ) -> std::result::Result<Request<()>, Status> {
        match self.check(&request) {
            Ok(()) => {
                trace!("handshake accepted");
                Ok(request)
            }
            Err(reason) => {
                warn!(%reason, "rejecting call with incompatible handshake");
                Err(rejection(&reason))
            }
        }
    }
}

fn rejection(reason: &str) -> Status {
    let mut metadata = MetadataMap::new();
    metadata.insert(REJECTION_HEADER, MetadataValue::from_static(REJECTED));
    Status::with_metadata(Code::FailedPrecondition, format!("incompatible plugin handshake: {}", reason), metadata)
}

/// True when `status` is a handshake rejection from [`HandshakeGuard`].
pub fn is_rejection(status: &Status) -> bool {
    status.code() == Code::FailedPrecondition && status.metadata().get(REJECTION_HEADER).and_then(|v| v.to_str().ok()) == Some(REJECTED)
}

fn ascii(
    value: &str,
    field: &str,
) -> Result<MetadataValue<Ascii>> {
    // header values accept obs-text bytes, but the guard reads them back with `to_str`
    if !value.bytes().all(|b| (0x20..0x7f).contains(&b)) {
        return Err(PluginError::Config(format!("handshake {} must be visible ASCII: '{}'", field, value)));
    }
    value.parse::<MetadataValue<Ascii>>().map_err(|_| PluginError::Config(format!("handshake {} must be visible ASCII: '{}'", field, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamped(config: &HandshakeConfig) -> Request<()> {
        let mut stamp = HandshakeStamp::new(config).unwrap();
        stamp.call(Request::new(())).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = HandshakeConfig::default();
        assert_eq!(config.protocol_version, 1);
        assert_eq!(config.magic_cookie_key, "ORKESTRA_PLUGIN");
        assert_eq!(config.magic_cookie_value, "hello");
    }

    #[test]
    fn test_verify_cookie() {
        let config = HandshakeConfig::default();
        assert!(config.verify_cookie(Some("hello")).is_ok());
        assert!(matches!(config.verify_cookie(Some("bye")), Err(PluginError::IncompatibleVersion(_))));
        assert!(matches!(config.verify_cookie(None), Err(PluginError::IncompatibleVersion(_))));
    }

    #[test]
    fn test_parse_line() {
        let line = HandshakeLine::parse("1|1|tcp|127.0.0.1:1234|grpc\n").unwrap();
        assert_eq!(line, HandshakeLine::grpc_tcp(1, "127.0.0.1:1234"));
        assert_eq!(line.to_string(), "1|1|tcp|127.0.0.1:1234|grpc");
        assert_eq!("1|1|tcp|127.0.0.1:1234|grpc".parse::<HandshakeLine>().unwrap(), line);
    }

    #[test]
    fn test_line_without_protocol_is_netrpc() {
        let line = HandshakeLine::parse("1|1|tcp|127.0.0.1:1234").unwrap();
        assert_eq!(line.protocol, Protocol::NetRpc);

        let err = HandshakeConfig::default().verify_line(&line).unwrap_err();
        assert!(matches!(err, PluginError::UnsupportedTransport(_)));
    }

    #[test]
    fn test_netrpc_rejected() {
        let line = HandshakeLine::parse("1|1|tcp|127.0.0.1:1234|netrpc").unwrap();
        assert!(matches!(HandshakeConfig::default().verify_line(&line), Err(PluginError::UnsupportedTransport(_))));
    }

    #[test]
    fn test_unix_network_rejected() {
        let line = HandshakeLine::parse("1|1|unix|/tmp/plugin.sock|grpc").unwrap();
        assert!(matches!(HandshakeConfig::default().verify_line(&line), Err(PluginError::UnsupportedTransport(_))));
    }

    #[test]
    fn test_version_mismatch() {
        let config = HandshakeConfig::default();
        let line = HandshakeLine::grpc_tcp(2, "127.0.0.1:1234");
        assert!(matches!(config.verify_line(&line), Err(PluginError::IncompatibleVersion(_))));

        let mut line = HandshakeLine::grpc_tcp(1, "127.0.0.1:1234");
        line.core_version = 2;
        assert!(matches!(config.verify_line(&line), Err(PluginError::IncompatibleVersion(_))));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(HandshakeLine::parse("hello world"), Err(PluginError::IncompatibleVersion(_))));
        assert!(matches!(HandshakeLine::parse("x|1|tcp|addr|grpc"), Err(PluginError::IncompatibleVersion(_))));
        assert!(matches!(HandshakeLine::parse("1|1|udp|addr|grpc"), Err(PluginError::UnsupportedTransport(_))));
        assert!(matches!(HandshakeLine::parse("1|1|tcp|addr|soap"), Err(PluginError::UnsupportedTransport(_))));
    }

    #[test]
    fn test_guard_accepts_matching_stamp() {
        let config = HandshakeConfig::default();
        let mut guard = HandshakeGuard::new(config.clone());
        assert!(guard.call(stamped(&config)).is_ok());
    }

    #[test]
    fn test_guard_rejects_mismatch() {
        let mut guard = HandshakeGuard::new(HandshakeConfig::default());

        let wrong_value = HandshakeConfig {
            magic_cookie_value: "goodbye".to_string(),
            ..Default::default()
        };
        let status = guard.call(stamped(&wrong_value)).unwrap_err();
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);
        assert!(is_rejection(&status));

        let wrong_version = HandshakeConfig {
            protocol_version: 7,
            ..Default::default()
        };
        assert!(guard.call(stamped(&wrong_version)).is_err());

        assert!(guard.call(Request::new(())).is_err());
    }

    #[test]
    fn test_plain_failed_precondition_is_not_rejection() {
        assert!(!is_rejection(&Status::failed_precondition("downstream schema too old")));
        assert!(!is_rejection(&Status::unknown("boom")));
    }

    #[test]
    fn test_netrpc_reported_before_version_skew() {
        let line = HandshakeLine::parse("1|9|tcp|127.0.0.1:1234|netrpc").unwrap();
        assert!(matches!(HandshakeConfig::default().verify_line(&line), Err(PluginError::UnsupportedTransport(_))));

        let line = HandshakeLine::parse("2|9|tcp|127.0.0.1:1234").unwrap();
        assert!(matches!(HandshakeConfig::default().verify_line(&line), Err(PluginError::UnsupportedTransport(_))));
    }

    #[test]
    fn test_stamp_rejects_control_characters() {
        let config = HandshakeConfig {
            magic_cookie_key: "KEY\tWITH_TAB".to_string(),
            ..Default::default()
        };
        assert!(matches!(HandshakeStamp::new(&config), Err(PluginError::Config(_))));
    }

    #[test]
    fn test_stamp_rejects_non_ascii() {
        let config = HandshakeConfig {
            magic_cookie_value: "h\u{e9}llo".to_string(),
            ..Default::default()
        };
        assert!(matches!(HandshakeStamp::new(&config), Err(PluginError::Config(_))));
    }
}
