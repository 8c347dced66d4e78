//! Wires one [`CommunicationProtocol`] implementation per [`TransportKind`]
//! into the explicit transport table the client core dispatches through.

use std::collections::HashMap;
use std::sync::Arc;

use utcp_core::auth::AuthApplier;
use utcp_transport_traits::CommunicationProtocol;
use utcp_types::TransportKind;

/// Build the default transport table: one protocol instance per kind,
/// each sharing the given `auth_applier`'s OAuth2 token cache where the
/// transport needs one (currently HTTP-family and gNMI).
#[must_use]
pub fn default_transports(auth_applier: &AuthApplier) -> HashMap<TransportKind, Arc<dyn CommunicationProtocol>> {
    let http_client = reqwest::Client::new();

    let mut table: HashMap<TransportKind, Arc<dyn CommunicationProtocol>> = HashMap::new();
    table.insert(TransportKind::Http, Arc::new(utcp_http::HttpProtocol::new(http_client.clone())));
    table.insert(
        TransportKind::StreamableHttp,
        Arc::new(utcp_http::StreamableHttpProtocol::new(http_client.clone())),
    );
    table.insert(TransportKind::Sse, Arc::new(utcp_http::SseProtocol::new(http_client)));
    table.insert(TransportKind::WebSocket, Arc::new(utcp_websocket::WebSocketProtocol::new()));
    table.insert(TransportKind::Tcp, Arc::new(utcp_tcp::TcpProtocol::new()));
    table.insert(TransportKind::Udp, Arc::new(utcp_tcp::UdpProtocol::new()));
    table.insert(TransportKind::Cli, Arc::new(utcp_cli::CliProtocol::new()));
    table.insert(TransportKind::Text, Arc::new(utcp_text::TextProtocol::new()));
    table.insert(TransportKind::Mcp, Arc::new(utcp_mcp::McpProtocol::new()));
    table.insert(TransportKind::Gnmi, Arc::new(utcp_gnmi::GnmiProtocol::new(auth_applier.clone())));
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_transport_kind_has_a_default_implementation() {
        let table = default_transports(&AuthApplier::default());
        for kind in [
            TransportKind::Http,
            TransportKind::StreamableHttp,
            TransportKind::Sse,
            TransportKind::WebSocket,
            TransportKind::Tcp,
            TransportKind::Udp,
            TransportKind::Cli,
            TransportKind::Text,
            TransportKind::Mcp,
            TransportKind::Gnmi,
        ] {
            assert!(table.contains_key(&kind), "missing transport for {kind}");
        }
    }
}
