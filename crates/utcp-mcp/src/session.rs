//! Per-server MCP session cache.

use std::collections::HashMap;
use std::sync::Arc;

use rmcp::transport::streamable_http_client::StreamableHttpClientTransport;
use rmcp::transport::TokioChildProcess;
use rmcp::{RoleClient, ServiceExt};
use tokio::process::Command;
use tokio::sync::{Mutex, RwLock};

use utcp_types::call_template::McpServerConfig;
use utcp_types::{UtcpError, UtcpResult};

/// A live MCP client connection, reused across calls to the same server.
pub type McpSession = rmcp::service::RunningService<RoleClient, ()>;

/// Caches one [`McpSession`] per configured server name, creating it lazily
/// and locking per-server during creation so concurrent first calls don't
/// race into opening duplicate subprocesses/connections.
#[derive(Default)]
pub struct SessionCache {
    sessions: RwLock<HashMap<String, Arc<McpSession>>>,
    creation_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache").finish_non_exhaustive()
    }
}

impl SessionCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached session for `server_name`, connecting via `config`
    /// if none exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`UtcpError::CallFailure`] when the connection attempt
    /// (subprocess spawn, HTTP/SSE handshake, or MCP initialize) fails.
    pub async fn get_or_create(
        &self,
        server_name: &str,
        config: &McpServerConfig,
    ) -> UtcpResult<Arc<McpSession>> {
        if let Some(session) = self.sessions.read().await.get(server_name) {
            return Ok(session.clone());
        }

        let lock = {
            let mut locks = self.creation_locks.lock().await;
            locks
                .entry(server_name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = lock.lock().await;

        if let Some(session) = self.sessions.read().await.get(server_name) {
            return Ok(session.clone());
        }

        let session = Arc::new(connect(config).await?);
        self.sessions
            .write()
            .await
            .insert(server_name.to_string(), session.clone());
        Ok(session)
    }

    /// Drop and close the cached session for `server_name`, if any.
    /// Idempotent: closing an unknown or already-closed server is not an
    /// error.
    pub async fn close(&self, server_name: &str) {
        if let Some(session) = self.sessions.write().await.remove(server_name) {
            if let Ok(session) = Arc::try_unwrap(session) {
                let _ = session.cancel().await;
            }
        }
    }

    /// Close every cached session belonging to any of `server_names`.
    pub async fn close_all(&self, server_names: impl IntoIterator<Item = impl AsRef<str>>) {
        for name in server_names {
            self.close(name.as_ref()).await;
        }
    }
}

async fn connect(config: &McpServerConfig) -> UtcpResult<McpSession> {
    match config {
        McpServerConfig::Stdio { command, args, env } => {
            let mut cmd = Command::new(command);
            cmd.args(args);
            for (k, v) in env {
                cmd.env(k, v);
            }
            let process = TokioChildProcess::new(cmd)
                .map_err(|e| UtcpError::CallFailure(format!("spawning MCP server: {e}")))?;
            ()
                .serve(process)
                .await
                .map_err(|e| UtcpError::CallFailure(format!("MCP stdio handshake failed: {e}")))
        }
        McpServerConfig::Http { url } => {
            let transport = StreamableHttpClientTransport::from_uri(url.clone());
            ()
                .serve(transport)
                .await
                .map_err(|e| UtcpError::CallFailure(format!("MCP HTTP handshake failed: {e}")))
        }
        McpServerConfig::Sse { url } => {
            let transport = rmcp::transport::SseClientTransport::start(url.clone())
                .await
                .map_err(|e| UtcpError::CallFailure(format!("connecting MCP SSE server: {e}")))?;
            ()
                .serve(transport)
                .await
                .map_err(|e| UtcpError::CallFailure(format!("MCP SSE handshake failed: {e}")))
        }
    }
}

/// True when `error`'s message looks like a transport/connection-level
/// failure rather than an application error, per the documented retry
/// classification ("connection", "transport", "closed", "timeout", ...).
#[must_use]
pub fn is_transport_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["connection", "transport", "closed", "timeout", "broken pipe", "reset"]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transport_errors_by_substring() {
        assert!(is_transport_error("Connection refused"));
        assert!(is_transport_error("stream closed unexpectedly"));
        assert!(is_transport_error("request timed out"));
        assert!(!is_transport_error("tool not found"));
    }
}
