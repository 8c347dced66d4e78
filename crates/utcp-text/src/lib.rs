//! Filesystem-document transport for the Universal Tool Calling Protocol.
//!
//! The text transport treats a call template as a pointer to one file on
//! disk: registration parses it as a manual, and the (single, implicit)
//! tool call returns its raw contents.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]

mod protocol;

pub use protocol::TextProtocol;
