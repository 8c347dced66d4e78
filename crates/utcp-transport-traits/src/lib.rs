//! # UTCP Transport Traits
//!
//! The uniform four-method contract every wire protocol implements: `register_manual`, `deregister_manual`, `call_tool`, and
//! `call_tool_streaming`. Transport crates (`utcp-http`, `utcp-websocket`,
//! `utcp-tcp`, `utcp-cli`, `utcp-text`, `utcp-mcp`, `utcp-gnmi`) each
//! provide one [`CommunicationProtocol`] implementation; the client core
//! (`utcp-client`) holds a registry keyed by [`utcp_types::TransportKind`]
//! and routes to the matching implementation.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]

mod context;
pub mod fallback;
mod protocol;

pub use context::TransportContext;
pub use protocol::{BoxStream, CommunicationProtocol};
