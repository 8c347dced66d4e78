//! HTTP-family transports for the Universal Tool Calling Protocol.
//!
//! Implements the three `reqwest`-based [`utcp_transport_traits::CommunicationProtocol`]
//! transports: plain HTTP request/response, chunked "streamable HTTP", and
//! Server-Sent Events.

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms, unreachable_pub, clippy::all)]

mod http;
mod request;
mod security;
mod sse;
mod streamable;

pub use http::HttpProtocol;
pub use sse::SseProtocol;
pub use streamable::StreamableHttpProtocol;
