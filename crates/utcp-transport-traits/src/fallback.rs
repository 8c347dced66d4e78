//! Shared helpers implementing the dispatch-fallback rule, so
//! every transport that lacks a native streaming or unary form doesn't
//! reimplement the aggregation/single-element logic.

use futures::StreamExt;
use serde_json::Value;

use utcp_types::UtcpResult;

use crate::protocol::BoxStream;

/// Wrap a single unary result as a one-element stream, for transports with
/// no native streaming form.
#[must_use]
pub fn stream_from_unary(result: UtcpResult<Value>) -> BoxStream<'static, UtcpResult<Value>> {
    Box::pin(futures::stream::once(async move { result }))
}

/// Read a stream to completion and concatenate it into a single unary
/// result, for transports whose unary form has no independent
/// implementation: byte strings concatenate, everything else collects into
/// a JSON array.
pub async fn unary_from_stream(
    mut stream: BoxStream<'static, UtcpResult<Value>>,
) -> UtcpResult<Value> {
    let mut items = Vec::new();
    let mut any_string = false;
    while let Some(item) = stream.next().await {
        let item = item?;
        any_string |= item.is_string();
        items.push(item);
    }
    if any_string && items.iter().all(|v| v.is_string()) {
        let joined: String = items
            .into_iter()
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .collect();
        Ok(Value::String(joined))
    } else {
        Ok(Value::Array(items))
    }
}
