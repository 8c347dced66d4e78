//! # UTCP MCP Transport
//!
//! The Model-Context-Protocol [`utcp_transport_traits::CommunicationProtocol`]:
//! a manual may fan out over several configured `mcpServers` (stdio
//! subprocesses or HTTP/SSE endpoints), each contributing its own tools
//! (and, optionally, its resources synthesized as `resource_<name>`
//! pseudo-tools) to one discovered manual.
//!
//! Sessions are cached per server name and reused across calls for the
//! lifetime of the registering manual; a session that fails with a
//! transport-level error during discovery is closed and recreated once
//! before the error is propagated.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]

mod discovery;
mod naming;
mod protocol;
mod result;
mod session;

pub use protocol::McpProtocol;
pub use session::SessionCache;
