//! adventure-mcp: a session-aware JSON-RPC server for a text adventure
//!
//! Each session controls one player. What the client can do, render or read
//! changes as the player moves through the world, and the server tells the
//! client whenever a list may have changed so it can fetch it again.
//!
//! # Architecture
//!
//! - **Registry**: sole owner of session and player state; every change goes
//!   through a validating mutator that emits typed events
//! - **Capabilities**: actions, templates and resources whose visibility is
//!   recomputed from current state on every call
//! - **Notifier**: turns events into `list_changed` notifications
//! - **Dispatcher**: per-connection JSON-RPC routing and session binding
//!
//! # Modules
//!
//! - [`capability`] — Action, template and resource providers
//! - [`config`] — Configuration loading and validation
//! - [`error`] — Error types
//! - [`generation`] — Optional generated flavour text
//! - [`mcp`] — JSON-RPC protocol, transport and server
//! - [`notifier`] — Change notifications
//! - [`session`] — Sessions and the registry
//! - [`world`] — World content

pub mod capability;
pub mod config;
pub mod error;
pub mod generation;
pub mod mcp;
pub mod notifier;
pub mod session;
pub mod world;
