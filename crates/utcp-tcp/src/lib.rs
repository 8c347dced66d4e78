//! TCP and UDP socket transports for the Universal Tool Calling Protocol.
//!
//! Implements the two raw-socket [`utcp_transport_traits::CommunicationProtocol`]
//! transports: length/delimiter/fixed/stream-framed TCP and
//! single-request/multi-datagram UDP.

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms, unreachable_pub, clippy::all)]

mod framing;
mod request;
mod tcp;
mod udp;

pub use tcp::TcpProtocol;
pub use udp::UdpProtocol;
