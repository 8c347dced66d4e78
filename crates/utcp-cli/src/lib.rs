//! # UTCP CLI Transport
//!
//! The local CLI subprocess [`utcp_transport_traits::CommunicationProtocol`]:
//! discovery runs a command and scans its output for a manual (or a legacy
//! `tool_provider`-keyed tool list), and calls run a (possibly multi-step)
//! command script, substituting `UTCP_ARG_<name>_UTCP_END` placeholders and
//! threading earlier steps' stdout into later steps as `CMD_<i>_OUTPUT`
//! environment variables.
//!
//! There is no persistent session: every discovery and call spawns its own
//! subprocess, so `deregister_manual` is a no-op.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]

mod discovery;
mod execute;
mod legacy;
mod protocol;

pub use protocol::CliProtocol;
