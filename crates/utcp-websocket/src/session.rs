//! Per-template WebSocket session cache: one
//! connection per `name+url`, reused across calls.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use utcp_types::{UtcpError, UtcpResult};

/// A live WebSocket connection.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Caches one [`WsStream`] per `name:url` key, connecting lazily and
/// locking per-key during creation so concurrent first calls don't race
/// into opening duplicate sockets.
#[derive(Default)]
pub struct SessionCache {
    sessions: RwLock<HashMap<String, Arc<Mutex<WsStream>>>>,
    creation_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache").finish_non_exhaustive()
    }
}

/// The key a session is cached under: `<name>:<url>`.
#[must_use]
pub fn session_key(name: &str, url: &str) -> String {
    format!("{name}:{url}")
}

impl SessionCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached connection for `key`, opening one against `url`
    /// (with `protocol` and `headers` applied to the handshake) if none
    /// exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`UtcpError::CallFailure`] if the handshake fails.
    pub async fn get_or_create(
        &self,
        key: &str,
        url: &str,
        protocol: Option<&str>,
        headers: &BTreeMap<String, String>,
    ) -> UtcpResult<Arc<Mutex<WsStream>>> {
        if let Some(session) = self.sessions.read().await.get(key) {
            return Ok(session.clone());
        }

        let lock = {
            let mut locks = self.creation_locks.lock().await;
            locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        let _guard = lock.lock().await;

        if let Some(session) = self.sessions.read().await.get(key) {
            return Ok(session.clone());
        }

        let stream = connect(url, protocol, headers).await?;
        let session = Arc::new(Mutex::new(stream));
        self.sessions.write().await.insert(key.to_string(), session.clone());
        Ok(session)
    }

    /// Drop and close the cached connection for `key`, if any. Idempotent.
    pub async fn close(&self, key: &str) {
        if let Some(session) = self.sessions.write().await.remove(key)
            && let Ok(mutex) = Arc::try_unwrap(session)
        {
            let mut stream = mutex.into_inner();
            let _ = stream.close(None).await;
        }
    }
}

async fn connect(
    url: &str,
    protocol: Option<&str>,
    headers: &BTreeMap<String, String>,
) -> UtcpResult<WsStream> {
    let mut request = url
        .into_client_request()
        .map_err(|e| UtcpError::CallFailure(format!("building WebSocket handshake request: {e}")))?;

    for (k, v) in headers {
        let name = tokio_tungstenite::tungstenite::http::HeaderName::from_bytes(k.as_bytes())
            .map_err(|e| UtcpError::CallFailure(format!("invalid header name '{k}': {e}")))?;
        let value = HeaderValue::from_str(v)
            .map_err(|e| UtcpError::CallFailure(format!("invalid header value for '{k}': {e}")))?;
        request.headers_mut().insert(name, value);
    }
    if let Some(proto) = protocol {
        let value = HeaderValue::from_str(proto)
            .map_err(|e| UtcpError::CallFailure(format!("invalid subprotocol '{proto}': {e}")))?;
        request.headers_mut().insert("Sec-WebSocket-Protocol", value);
    }

    let (stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| UtcpError::CallFailure(format!("WebSocket handshake to {url} failed: {e}")))?;
    Ok(stream)
}
