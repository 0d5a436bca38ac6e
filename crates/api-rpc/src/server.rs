//! JSON-RPC Server
//!
//! JSON-RPC 2.0 over HTTP on localhost TCP.

use crate::handler::RpcHandler;
use crate::types::{EnqueueRequest, GetJobRequest};
use conductor_core::error::{AppError, Result};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub const ENV_RPC_PORT: &str = "CONDUCTOR_RPC_PORT";
pub const ENV_RATE_LIMIT_BURST: &str = "CONDUCTOR_RATE_LIMIT_BURST";
pub const ENV_RATE_LIMIT_RATE: &str = "CONDUCTOR_RATE_LIMIT_RATE";

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9527;

/// RPC Server Configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit_burst: u32,
    pub rate_limit_per_sec: u32,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
            rate_limit_burst: 200,
            rate_limit_per_sec: 100,
        }
    }
}

impl RpcServerConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(port) = env_num(ENV_RPC_PORT)? {
            config.port = port;
        }
        if let Some(burst) = env_num(ENV_RATE_LIMIT_BURST)? {
            config.rate_limit_burst = burst;
        }
        if let Some(rate) = env_num(ENV_RATE_LIMIT_RATE)? {
            config.rate_limit_per_sec = rate;
        }
        Ok(config)
    }
}

fn env_num<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AppError::Config(format!("{} must be a number (got '{}')", key, raw))),
        Err(_) => Ok(None),
    }
}

fn register_err(e: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("Failed to register RPC method: {}", e))
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: RpcHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Bind and start serving; the returned handle stops the server
    ///
    /// Only binds to 127.0.0.1 (no external access).
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to bind RPC server on {}: {}", addr, e)))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let module = self.module()?;
        info!(addr = %local_addr, "JSON-RPC server listening");

        Ok((local_addr, server.start(module)))
    }

    fn module(&self) -> Result<RpcModule<()>> {
        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("jobs.enqueue.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: EnqueueRequest = params.parse()?;
                    handler.enqueue(req).await
                }
            })
            .map_err(register_err)?;

        let handler = self.handler.clone();
        module
            .register_async_method("jobs.get.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: GetJobRequest = params.parse()?;
                    handler.get_job(req).await
                }
            })
            .map_err(register_err)?;

        let handler = self.handler.clone();
        module
            .register_async_method("admin.health.v1", move |_, _, _| {
                let handler = handler.clone();
                async move { handler.health().await }
            })
            .map_err(register_err)?;

        let handler = self.handler.clone();
        module
            .register_async_method("admin.prune.v1", move |_, _, _| {
                let handler = handler.clone();
                async move { handler.prune().await }
            })
            .map_err(register_err)?;

        Ok(module)
    }
}
