//! The `CommunicationProtocol` contract.

use async_trait::async_trait;
use futures::stream::Stream;
use serde_json::Value;
use std::pin::Pin;

use utcp_types::{CallTemplate, RegisterManualResult, UtcpResult};

use crate::context::TransportContext;

/// A boxed, owned stream of streaming-call results, matching the "async
/// generators -> idiomatic streaming primitive" mapping.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// The uniform transport contract every wire protocol implements.
///
/// `register_manual` never raises for protocol-level errors; it packs them
/// into `RegisterManualResult.errors` instead. The remaining
/// three methods raise: deregistration failures and call failures are
/// always surfaced to the caller.
///
/// A transport that cannot stream natively emits exactly one element equal
/// to its unary result from `call_tool_streaming`; a transport whose unary
/// form aggregates a stream reads the stream to completion and
/// concatenates it for `call_tool`.
#[async_trait]
pub trait CommunicationProtocol: Send + Sync + std::fmt::Debug {
    /// Discover a manual by calling whatever discovery mechanism `template`
    /// implies (HTTP GET, WebSocket `{"type":"utcp"}`, CLI execution, file
    /// read, OpenAPI conversion, MCP `list_tools`, ...).
    ///
    /// Tool names in the returned manual are **not** yet namespaced with
    /// `<manual>.` — the client core applies that prefix.
    async fn register_manual(
        &self,
        ctx: &TransportContext,
        template: &CallTemplate,
    ) -> RegisterManualResult;

    /// Close any session this transport opened for `template`'s manual
    /// (SSE response, WebSocket connection, MCP session, ...). Idempotent:
    /// deregistering an already-closed or never-opened manual is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error only when the underlying close itself fails (e.g.
    /// a socket shutdown call errors); a missing session is not an error.
    async fn deregister_manual(
        &self,
        ctx: &TransportContext,
        template: &CallTemplate,
    ) -> UtcpResult<()>;

    /// Invoke `tool_name` with `args` against `template`, returning the
    /// decoded result.
    ///
    /// # Errors
    ///
    /// Returns [`utcp_types::UtcpError::CallFailure`] (or a more specific
    /// variant) on timeout, connection failure, protocol error, or a
    /// remote status `>= 400`.
    async fn call_tool(
        &self,
        ctx: &TransportContext,
        tool_name: &str,
        args: Value,
        template: &CallTemplate,
    ) -> UtcpResult<Value>;

    /// Invoke `tool_name` as a streaming call, yielding each decoded
    /// element in wire-arrival order.
    ///
    /// # Errors
    ///
    /// The returned stream yields an error element on the same failure
    /// conditions as [`CommunicationProtocol::call_tool`]; establishing the
    /// stream itself can also fail before any element is produced.
    async fn call_tool_streaming(
        &self,
        ctx: &TransportContext,
        tool_name: &str,
        args: Value,
        template: &CallTemplate,
    ) -> UtcpResult<BoxStream<'static, UtcpResult<Value>>>;
}
