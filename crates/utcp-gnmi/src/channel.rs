//! gRPC channel construction and the localhost-only insecure-channel
//! security gate.

use std::net::IpAddr;
use std::str::FromStr;

use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use utcp_types::{UtcpError, UtcpResult};

/// True when `target`'s host is `localhost` or a loopback address, the only
/// case an insecure gNMI channel is permitted.
fn is_local_target(target: &str) -> bool {
    let host = target.rsplit_once(':').map_or(target, |(h, _)| h);
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    IpAddr::from_str(host).is_ok_and(|ip| ip.is_loopback())
}

/// Build a `tonic` channel to `target`, refusing an insecure (`use_tls =
/// false`) channel to anything but localhost/loopback.
///
/// # Errors
///
/// Returns [`UtcpError::SecurityViolation`] for a non-local insecure
/// target, or [`UtcpError::CallFailure`] if the channel fails to connect.
pub(crate) async fn connect(target: &str, use_tls: bool) -> UtcpResult<Channel> {
    if !use_tls && !is_local_target(target) {
        return Err(UtcpError::SecurityViolation(format!(
            "insecure gNMI channel to {target} is only allowed for localhost or loopback addresses"
        )));
    }

    let uri = format!("{}://{target}", if use_tls { "https" } else { "http" });
    let mut endpoint = Endpoint::from_shared(uri)
        .map_err(|e| UtcpError::CallFailure(format!("invalid gNMI target {target:?}: {e}")))?;
    if use_tls {
        endpoint = endpoint
            .tls_config(ClientTlsConfig::new())
            .map_err(|e| UtcpError::CallFailure(format!("configuring TLS for {target}: {e}")))?;
    }

    endpoint
        .connect()
        .await
        .map_err(|e| UtcpError::CallFailure(format!("connecting to {target}: {e}")))
}
