use std::{io::Write, sync::Arc};

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, codegen::InterceptedService, transport::Server};
use tracing::{debug, info, warn};

use crate::{
    Config, Result, codec,
    handshake::{HandshakeConfig, HandshakeGuard, HandshakeLine},
    pb::{
        self,
        node_executor_server::{self, NodeExecutorServer},
    },
    service::NodeExecutor,
};

/// Plugin-side server dispatching gRPC calls into a local [`NodeExecutor`].
pub struct PluginServer {
    executor: Arc<dyn NodeExecutor>,
    handshake: HandshakeConfig,
}

impl PluginServer {
    pub fn new(
        executor: impl NodeExecutor + 'static,
        handshake: HandshakeConfig,
    ) -> Self {
        Self::from_arc(Arc::new(executor), handshake)
    }

    pub fn from_arc(
        executor: Arc<dyn NodeExecutor>,
        handshake: HandshakeConfig,
    ) -> Self {
        Self {
            executor,
            handshake,
        }
    }

    /// The gRPC service, guarded by the handshake check.
    pub fn service(&self) -> InterceptedService<NodeExecutorServer<Dispatcher>, HandshakeGuard> {
        let dispatcher = Dispatcher {
            executor: self.executor.clone(),
        };
        NodeExecutorServer::with_interceptor(dispatcher, HandshakeGuard::new(self.handshake.clone()))
    }

    /// Entry point of a plugin binary.
    ///
    /// Refuses to run unless launched with the magic cookie, announces the
    /// handshake line on stdout, then serves until ctrl-c.
    pub async fn serve(
        self,
        config: &Config,
    ) -> Result<()> {
        self.handshake.verify_env()?;

        let listener = TcpListener::bind(&config.server.address).await?;
        let address = listener.local_addr()?;
        let line = HandshakeLine::grpc_tcp(self.handshake.protocol_version, address.to_string());

        {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", line)?;
            stdout.flush()?;
        }
        info!(%address, "plugin listening");

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                signal.cancel();
            }
        });

        self.serve_with_listener(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` is cancelled.
    pub async fn serve_with_listener(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        Server::builder()
            .add_service(self.service())
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown.cancelled_owned())
            .await?;
        debug!("plugin server stopped");
        Ok(())
    }
}

/// Decodes requests, runs the executor and encodes its result.
pub struct Dispatcher {
    executor: Arc<dyn NodeExecutor>,
}

#[tonic::async_trait]
impl node_executor_server::NodeExecutor for Dispatcher {
    async fn execute(
        &self,
        request: Request<pb::ExecuteRequest>,
    ) -> std::result::Result<Response<pb::ExecuteResponse>, Status> {
        let (node, ctx) = codec::decode_request(request.into_inner()).map_err(|e| {
            warn!(error = %e, "rejecting undecodable execute request");
            Status::from(e)
        })?;

        let nid = node.id.clone();
        debug!(node = %nid, uses = %node.uses, "dispatching execute");

        let result = self.executor.execute(node, ctx).await.map_err(|e| {
            warn!(node = %nid, error = %e, "node execution failed");
            Status::from(e)
        })?;

        Ok(Response::new(codec::encode_response(&result)?))
    }

    async fn get_capabilities(
        &self,
        _request: Request<pb::Empty>,
    ) -> std::result::Result<Response<pb::GetCapabilitiesResponse>, Status> {
        let uses = self.executor.get_capabilities().await?;
        Ok(Response::new(pb::GetCapabilitiesResponse {
            uses,
        }))
    }
}
