//! JSON-RPC server surface.
//!
//! Exposes the session registry's capabilities to a client over
//! newline-delimited JSON-RPC 2.0 on stdio.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          McpServer                           │
//! │                                                              │
//! │   ┌─────────────┐    ┌─────────────┐    ┌────────────────┐   │
//! │   │  Transport  │───▶│ Dispatcher  │───▶│   Providers    │   │
//! │   │   (stdio)   │    │ (sessions)  │    │ actions, ...   │   │
//! │   └─────────────┘    └─────────────┘    └────────────────┘   │
//! │          ▲                  │                   │            │
//! │          │                  ▼                   ▼            │
//! │   ┌─────────────┐    ┌─────────────┐    ┌────────────────┐   │
//! │   │   Writer    │◀───│  Notifier   │◀───│    Registry    │   │
//! │   └─────────────┘    └─────────────┘    └────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets protocol version 2024-11-05.

pub mod dispatcher;
pub mod protocol;
pub mod sampling;
pub mod server;
pub mod transport;

pub use dispatcher::{ConnectionState, Dispatcher};
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::McpServer;
pub use transport::{LineReader, LineWriter};
