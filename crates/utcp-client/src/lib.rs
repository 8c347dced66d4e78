//! # UTCP Client
//!
//! The Tool Repository (C3), Client Core (C6), and Config Loader (C7):
//! the pieces that turn a set of call templates into a working client.
//!
//! ## Module organization
//!
//! - [`repository`]: [`ToolRepository`], the concurrent, linearizable
//!   store of manuals and their tools.
//! - [`search`]: [`ToolSearchStrategy`] and its default
//!   [`TagSearchStrategy`] implementation, pluggable via [`ClientConfig`].
//! - [`config`]: [`ClientConfig`], [`ClientConfigSource`], and
//!   [`PostProcessor`] — the client's startup state and its config
//!   loader.
//! - [`transports`]: [`transports::default_transports`], wiring one
//!   [`utcp_transport_traits::CommunicationProtocol`] per
//!   [`utcp_types::TransportKind`].
//! - [`client`]: [`UtcpClient`], the entry point tying the above together
//!   with variable substitution (`utcp-core`) into
//!   `register_manual`/`call_tool`/`search_tools`.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]

mod client;
mod config;
mod repository;
mod search;
mod transports;

pub use client::UtcpClient;
pub use config::{ClientConfig, ClientConfigSource, PostProcessor};
pub use repository::ToolRepository;
pub use search::{TagSearchStrategy, ToolSearchStrategy};
pub use transports::default_transports;
