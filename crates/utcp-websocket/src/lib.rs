//! WebSocket transport for the Universal Tool Calling Protocol.
//!
//! Implements [`utcp_transport_traits::CommunicationProtocol`] over a
//! persistent, per-template `tokio-tungstenite` connection.

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms, unreachable_pub, clippy::all)]

mod message;
mod protocol;
mod security;
mod session;

pub use protocol::WebSocketProtocol;
