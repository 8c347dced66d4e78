//! # UTCP Types
//!
//! Core data model for the Universal Tool Calling Protocol (UTCP) — the
//! foundation shared by every transport and by the client core.
//!
//! This crate provides the types that flow across the whole client:
//!
//! - **Call templates**: [`CallTemplate`], the tagged union over transport
//!   kinds (HTTP, WebSocket, CLI, TCP/UDP, text, MCP, gNMI, ...).
//! - **Auth descriptors**: [`Auth`], covering API key, Basic and OAuth2.
//! - **Schema**: [`JsonSchema`], a recursive JSON-Schema node.
//! - **Catalog types**: [`Tool`], [`Manual`], [`RegisterManualResult`].
//! - **Errors**: [`UtcpError`], the stable error categories.
//!
//! ## Design principles
//!
//! 1. **Single source of truth** - every other crate in the workspace
//!    depends on these types instead of redefining them.
//! 2. **Tagged unions over inheritance** - `CallTemplate` and `Auth` are
//!    `#[serde(tag = "...")]` enums, matching how the wire format
//!    discriminates them.
//! 3. **no hidden state** - these are plain data types; behavior lives in
//!    `utcp-core` and the transport crates.

#![warn(missing_docs)]

pub mod auth;
pub mod call_template;
pub mod error;
pub mod manual;
pub mod schema;
pub mod tool;

pub use auth::Auth;
pub use call_template::{CallTemplate, TransportKind};
pub use error::{UtcpError, UtcpResult};
pub use manual::{Manual, RegisterManualResult};
pub use schema::JsonSchema;
pub use tool::Tool;

/// Version of the UTCP types crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// UTCP wire protocol version this crate targets.
pub const UTCP_VERSION: &str = "1.0.0";
