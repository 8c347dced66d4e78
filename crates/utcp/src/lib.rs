//! # UTCP
//!
//! A Rust client for the Universal Tool Calling Protocol (UTCP): discover
//! tools from HTTP, WebSocket, TCP/UDP, CLI, text, MCP, and gNMI call
//! templates, then call them through one [`UtcpClient`].
//!
//! ```no_run
//! use utcp::{ClientConfig, ClientConfigSource, UtcpClient};
//!
//! # async fn run() -> utcp::UtcpResult<()> {
//! let client = UtcpClient::create(ClientConfig::default()).await?;
//! let tools = client.search_tools("weather", 10).await;
//! # let _ = tools;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate organization
//!
//! This crate is a thin facade: `utcp-types` supplies the data model
//! (`CallTemplate`, `Tool`, `Manual`, `Auth`), `utcp-core` supplies
//! variable substitution and auth application, `utcp-transport-traits`
//! supplies the `CommunicationProtocol` contract every transport
//! implements, and `utcp-client` ties them together into `UtcpClient`,
//! `ToolRepository`, and the config loader. Transport implementations
//! (`utcp-http`, `utcp-websocket`, `utcp-tcp`, `utcp-cli`, `utcp-text`,
//! `utcp-mcp`, `utcp-gnmi`) are wired in unconditionally by `utcp-client`
//! rather than gated behind this crate's features.
//!
//! The [`prelude`] module re-exports the names most programs need.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]

pub use utcp_client::{
    default_transports, ClientConfig, ClientConfigSource, PostProcessor, TagSearchStrategy, ToolSearchStrategy, UtcpClient,
};
pub use utcp_core::auth::{AuthApplier, BasicCredentials, RequestState};
pub use utcp_core::naming::sanitize_name;
pub use utcp_core::variables::{DotenvLoader, VariableContext, VariableLoader, VariableSubstitutor};
pub use utcp_transport_traits::{BoxStream, CommunicationProtocol, TransportContext};
pub use utcp_types::{
    call_template::{CliCommandStep, Endian, FramingStrategy, HttpMethod, McpConfig, McpServerConfig, RequestDataFormat, ResponseFormat},
    Auth, CallTemplate, JsonSchema, Manual, RegisterManualResult, Tool, TransportKind, UtcpError, UtcpResult,
};

/// The names most programs need, in one `use utcp::prelude::*;`.
pub mod prelude {
    pub use crate::{
        Auth, CallTemplate, ClientConfig, ClientConfigSource, JsonSchema, Manual, PostProcessor, Tool, ToolSearchStrategy,
        TransportKind, UtcpClient, UtcpError, UtcpResult,
    };
}
