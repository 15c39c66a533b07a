//! JSON-RPC Server
//!
//! Serves HTTP and WebSocket on one TCP port bound to localhost by default.

use crate::handler::RpcHandler;
use crate::types::{
    AdvanceRequest, JoinRequest, RemoveRequest, SettingsRequest, SnapshotRequest, StatsRequest,
    SubscribeRequest,
};
use jsonrpsee::core::SubscriptionResult;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::{PendingSubscriptionSink, RpcModule, SubscriptionMessage};
use queueline_core::application::QueueCoordinator;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9630;

/// Subscription method names
pub const SUBSCRIBE_METHOD: &str = "queue.subscribe.v1";
pub const UNSUBSCRIBE_METHOD: &str = "queue.unsubscribe.v1";
pub const SNAPSHOT_NOTIFICATION: &str = "queue.snapshot";

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind JSON-RPC server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to register RPC method: {0}")]
    Register(String),
}

/// A running server: where it listens and the handle that stops it
pub struct StartedServer {
    pub addr: SocketAddr,
    pub handle: ServerHandle,
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, coordinator: Arc<QueueCoordinator>) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(coordinator)),
        }
    }

    /// Start the JSON-RPC server. Port 0 picks a free port.
    pub async fn start(self) -> Result<StartedServer, ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = server.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

        let module = self.build_module()?;

        info!(addr = %local_addr, "JSON-RPC server started");
        let handle = server.start(module);
        Ok(StartedServer {
            addr: local_addr,
            handle,
        })
    }

    fn build_module(&self) -> Result<RpcModule<()>, ServerError> {
        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("queue.join.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: JoinRequest = params.parse()?;
                    handler.join(req).await
                }
            })
            .map_err(|e| ServerError::Register(e.to_string()))?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.advance.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: AdvanceRequest = params.parse()?;
                    handler.advance(req).await
                }
            })
            .map_err(|e| ServerError::Register(e.to_string()))?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.remove.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: RemoveRequest = params.parse()?;
                    handler.remove(req).await
                }
            })
            .map_err(|e| ServerError::Register(e.to_string()))?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.snapshot.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: SnapshotRequest = params.parse()?;
                    handler.snapshot(req).await
                }
            })
            .map_err(|e| ServerError::Register(e.to_string()))?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.stats.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: StatsRequest = params.parse()?;
                    handler.stats(req).await
                }
            })
            .map_err(|e| ServerError::Register(e.to_string()))?;

        // Admin
        let handler = self.handler.clone();
        module
            .register_method("admin.settings.v1", move |params, _, _| {
                // Parameters are optional: no params reads the current value
                let req: Option<SettingsRequest> = params.parse()?;
                handler.settings(req.unwrap_or_default())
            })
            .map_err(|e| ServerError::Register(e.to_string()))?;

        let handler = self.handler.clone();
        module
            .register_subscription(
                SUBSCRIBE_METHOD,
                SNAPSHOT_NOTIFICATION,
                UNSUBSCRIBE_METHOD,
                move |params, pending, _, _| {
                    let handler = handler.clone();
                    async move { stream_snapshots(handler, params.parse(), pending).await }
                },
            )
            .map_err(|e| ServerError::Register(e.to_string()))?;

        Ok(module)
    }
}

/// Push the current snapshot, then every newer one until the client leaves
async fn stream_snapshots(
    handler: Arc<RpcHandler>,
    req: Result<SubscribeRequest, jsonrpsee::types::ErrorObjectOwned>,
    pending: PendingSubscriptionSink,
) -> SubscriptionResult {
    let req = match req {
        Ok(req) => req,
        Err(e) => {
            pending.reject(e).await;
            return Ok(());
        }
    };
    let mut subscription = match handler.subscribe(&req.business_id).await {
        Ok(subscription) => subscription,
        Err(e) => {
            pending.reject(e).await;
            return Ok(());
        }
    };

    let sink = pending.accept().await?;
    sink.send(SubscriptionMessage::from_json(&*subscription.current())?)
        .await?;

    loop {
        tokio::select! {
            _ = sink.closed() => break,
            next = subscription.next() => match next {
                Some(snapshot) => {
                    sink.send(SubscriptionMessage::from_json(&*snapshot)?).await?;
                }
                None => break,
            },
        }
    }

    debug!(business_id = %req.business_id, "RPC snapshot subscription closed");
    Ok(())
}
