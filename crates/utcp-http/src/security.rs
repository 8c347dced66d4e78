//! The security gate shared by HTTP, Streamable HTTP, and SSE call
//! templates: only `https://` or loopback `http://` URLs are
//! permitted, preventing MITM against plaintext non-local endpoints.

use utcp_types::{UtcpError, UtcpResult};

/// Reject any URL that is not `https://` or `http://localhost`/`127.0.0.1`.
pub fn check_url(url: &str) -> UtcpResult<()> {
    if url.starts_with("https://")
        || url.starts_with("http://localhost")
        || url.starts_with("http://127.0.0.1")
    {
        Ok(())
    } else {
        Err(UtcpError::SecurityViolation(format!(
            "HTTP transport requires https:// or localhost http://, got: {url}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_https_and_localhost() {
        assert!(check_url("https://api.example.com").is_ok());
        assert!(check_url("http://localhost:8080").is_ok());
        assert!(check_url("http://127.0.0.1:9000").is_ok());
    }

    #[test]
    fn rejects_plain_http_to_remote_host() {
        assert!(check_url("http://api.example.com").is_err());
    }
}
