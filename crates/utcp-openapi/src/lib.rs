//! # UTCP OpenAPI Converter
//!
//! Converts an OpenAPI 2.0/3.0 document into a UTCP [`utcp_types::Manual`]
//! at discovery time: one [`utcp_types::Tool`] per
//! `{path, method}` operation carrying an `operationId`, with `$ref`
//! resolution, input/output schema extraction, and security-scheme-to-auth
//! mapping.
//!
//! The HTTP transport (`utcp-http`) dispatches into [`convert`] whenever a
//! discovery response looks like an OpenAPI document rather than a native
//! UTCP manual (distinguished by the absence of `utcp_version`+`tools`).

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]

mod converter;
mod refs;
mod schema;
mod security;

pub use converter::convert;
pub use security::{auth_from_scheme, is_compatible, PlaceholderCounter};
