//! JSON-RPC API Layer
//!
//! JSON-RPC 2.0 surface of the queue for kiosk, dashboard and admin clients.
//! Plain calls work over HTTP; the snapshot subscription needs WebSocket.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig, ServerError, StartedServer};
