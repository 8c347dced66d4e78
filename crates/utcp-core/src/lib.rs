//! # UTCP Core
//!
//! Variable substitution (C1) and auth application (C2): the two pieces of
//! behavior every transport shares before it ever opens a connection.
//!
//! ## Module organization
//!
//! - [`variables`]: `$NAME`/`${NAME}` substitution over a value graph, with
//!   per-manual namespacing and a three-tier resolution order.
//! - [`auth`]: turns an [`utcp_types::Auth`] descriptor into headers, query
//!   parameters, or cookies mutated on a [`auth::RequestState`], including
//!   the OAuth2 client-credentials flow with token caching.
//!
//! Both stages run before a call template ever reaches a transport crate;
//! transports depend on this crate rather than reimplementing either piece.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]

pub mod auth;
pub mod naming;
pub mod variables;

pub use auth::{AuthApplier, BasicCredentials, RequestState};
pub use naming::sanitize_name;
pub use variables::{DotenvLoader, VariableContext, VariableLoader, VariableSubstitutor};
