//! # UTCP gNMI Transport
//!
//! The gNMI gRPC [`utcp_transport_traits::CommunicationProtocol`]: registering
//! a manual synthesizes four virtual tools — `capabilities`, `get`, `set`,
//! `subscribe` — each carrying a copy of the manual's call template with its
//! own `operation` set. Calls build the corresponding gNMI request message,
//! dispatch over a `tonic` channel, and convert the protobuf response back to
//! a plain JSON value.
//!
//! Dynamic module import for the generated stub/message modules is realized
//! here as a single vendored `gnmi.proto` (`proto/gnmi.proto`) compiled at
//! build time; `stub_module` and `message_module` on the call template are
//! retained for wire compatibility but this crate only ever dispatches
//! against its own generated binding.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]

mod channel;
mod convert;
mod metadata;
mod protocol;

/// Generated gNMI client stub and message types.
pub mod proto {
    tonic::include_proto!("gnmi");
}

pub use protocol::GnmiProtocol;
