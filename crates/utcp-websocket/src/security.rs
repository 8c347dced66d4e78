//! The security gate for WebSocket call templates: only `wss://` or loopback `ws://` URLs are permitted.

use utcp_types::{UtcpError, UtcpResult};

/// Reject any URL that is not `wss://` or `ws://localhost`/`127.0.0.1`.
pub fn check_url(url: &str) -> UtcpResult<()> {
    if url.starts_with("wss://") || url.starts_with("ws://localhost") || url.starts_with("ws://127.0.0.1") {
        Ok(())
    } else {
        Err(UtcpError::SecurityViolation(format!(
            "WebSocket transport requires wss:// or localhost ws://, got: {url}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_wss_and_localhost() {
        assert!(check_url("wss://api.example.com").is_ok());
        assert!(check_url("ws://localhost:8080").is_ok());
        assert!(check_url("ws://127.0.0.1:9000").is_ok());
    }

    #[test]
    fn rejects_plain_ws_to_remote_host() {
        assert!(check_url("ws://api.example.com").is_err());
    }
}
