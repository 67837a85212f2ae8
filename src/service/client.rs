use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;
use tonic::{
    Code, Request, Response, Status,
    codegen::InterceptedService,
    transport::{Channel, Endpoint},
};
use tracing::{debug, info};

use crate::{
    Config, PluginError, Result, codec,
    handshake::HandshakeStamp,
    model::{ExecutionContext, Node},
    pb::{self, node_executor_client::NodeExecutorClient},
    service::{CallOptions, NodeExecutor},
    transport::TransportFactory,
};

type GrpcClient = NodeExecutorClient<InterceptedService<Channel, HandshakeStamp>>;

/// Host-side proxy for a plugin's [`NodeExecutor`].
///
/// Cloning is cheap, clones share the underlying connection.
#[derive(Clone)]
pub struct PluginClient {
    client: GrpcClient,
    options: CallOptions,
}

impl PluginClient {
    /// Connects to a plugin.
    ///
    /// The handshake line from `factory` is verified first, then one
    /// `GetCapabilities` call is made so that a plugin rejecting our handshake
    /// fails here instead of on the first `execute`.
    pub async fn connect(
        factory: &dyn TransportFactory,
        config: &Config,
    ) -> Result<Self> {
        let line = factory.establish(&config.handshake).await?;
        config.handshake.verify_line(&line)?;
        debug!(address = %line.address, version = line.app_version, "plugin handshake line accepted");

        let channel = Endpoint::from_shared(format!("http://{}", line.address))
            .map_err(|e| PluginError::Transport(format!("invalid plugin address '{}': {}", line.address, e)))?
            .connect_timeout(config.client.connect_timeout())
            .connect()
            .await
            .map_err(|e| PluginError::Transport(format!("failed to connect to plugin at {}: {}", line.address, e)))?;

        let client = Self {
            client: NodeExecutorClient::with_interceptor(channel, HandshakeStamp::new(&config.handshake)?),
            options: config.client.call_options(),
        };

        let handshake_call = CallOptions::new().with_timeout(config.client.connect_timeout());
        let capabilities = client.capabilities_with(&handshake_call).await?;
        info!(address = %line.address, ?capabilities, "connected to plugin");

        Ok(client)
    }

    /// Call options used by [`NodeExecutor::execute`] and [`NodeExecutor::get_capabilities`].
    pub fn default_options(&self) -> &CallOptions {
        &self.options
    }

    pub fn set_default_options(
        &mut self,
        options: CallOptions,
    ) {
        self.options = options;
    }

    pub async fn execute_with(
        &self,
        node: &Node,
        ctx: &ExecutionContext,
        options: &CallOptions,
    ) -> Result<Value> {
        let request = codec::encode_request(node, ctx)?;
        debug!(node = %node.id, uses = %node.uses, "execute");

        let mut client = self.client.clone();
        let response = invoke("execute", options, client.execute(request_with(request, options))).await?;
        codec::decode_response(response)
    }

    pub async fn capabilities_with(
        &self,
        options: &CallOptions,
    ) -> Result<Vec<String>> {
        let mut client = self.client.clone();
        let response = invoke("get_capabilities", options, client.get_capabilities(request_with(pb::Empty {}, options))).await?;
        Ok(response.uses)
    }
}

#[async_trait]
impl NodeExecutor for PluginClient {
    async fn execute(
        &self,
        node: Node,
        ctx: ExecutionContext,
    ) -> Result<Value> {
        self.execute_with(&node, &ctx, &self.options).await
    }

    async fn get_capabilities(&self) -> Result<Vec<String>> {
        self.capabilities_with(&self.options).await
    }
}

fn request_with<T>(
    message: T,
    options: &CallOptions,
) -> Request<T> {
    let mut request = Request::new(message);
    if let Some(timeout) = options.timeout {
        // lets the plugin give up as well
        request.set_timeout(timeout);
    }
    request
}

/// Awaits a unary call within the caller's deadline and cancellation.
async fn invoke<T, F>(
    method: &'static str,
    options: &CallOptions,
    call: F,
) -> Result<T>
where
    F: Future<Output = std::result::Result<Response<T>, Status>>,
{
    let bounded = async {
        let response = match options.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(response) => response,
                Err(_) => {
                    return Err(PluginError::Remote {
                        code: Code::DeadlineExceeded,
                        message: format!("'{}' did not complete within {:?}", method, timeout),
                    });
                }
            },
            None => call.await,
        };
        response.map(Response::into_inner).map_err(PluginError::from)
    };

    match &options.cancel {
        Some(cancel) => {
            tokio::select! {
                result = bounded => result,
                _ = cancel.cancelled() => Err(PluginError::Remote {
                    code: Code::Cancelled,
                    message: format!("'{}' cancelled by caller", method),
                }),
            }
        }
        None => bounded.await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_invoke_passes_response() {
        let result = invoke("test", &CallOptions::new(), async { Ok::<_, Status>(Response::new(7u32)) }).await.unwrap();
        assert_eq!(result, 7);
    }

    #[tokio::test]
    async fn test_invoke_maps_status() {
        let err = invoke::<u32, _>("test", &CallOptions::new(), async { Err::<Response<u32>, _>(Status::unknown("boom")) }).await.unwrap_err();
        assert!(matches!(err, PluginError::Remote { code: Code::Unknown, ref message } if message == "boom"));
    }

    #[tokio::test]
    async fn test_invoke_deadline() {
        let options = CallOptions::new().with_timeout(Duration::from_millis(20));
        let call = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, Status>(Response::new(1u32))
        };
        let err = invoke("test", &options, call).await.unwrap_err();
        assert_eq!(err.code(), Some(Code::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_invoke_cancelled() {
        let cancel = CancellationToken::new();
        let options = CallOptions::new().with_cancel(cancel.clone());
        let call = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, Status>(Response::new(1u32))
        };

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let err = invoke("test", &options, call).await.unwrap_err();
        assert_eq!(err.code(), Some(Code::Cancelled));
    }

    #[test]
    fn test_request_carries_timeout() {
        let request = request_with((), &CallOptions::new().with_timeout(Duration::from_secs(2)));
        assert!(request.metadata().get("grpc-timeout").is_some());

        let request = request_with((), &CallOptions::new());
        assert!(request.metadata().get("grpc-timeout").is_none());
    }
}
