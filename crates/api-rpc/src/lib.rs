//! JSON-RPC API Layer
//!
//! Producer boundary and operational queries of the Conductor daemon.

pub mod error;
pub mod handler;
mod rate_limiter;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
