//! Call templates: the per-endpoint configuration used for both manual
//! discovery and tool invocation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::Auth;

/// The wire protocol a call template dispatches through.
///
/// Doubles as the `allowed_communication_protocols` element type:
/// a manual's tools are filtered to those whose own call template kind is in
/// this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// HTTP request/response.
    Http,
    /// HTTP streamable (chunked/ndjson).
    StreamableHttp,
    /// Server-Sent Events.
    Sse,
    /// WebSocket.
    WebSocket,
    /// Local CLI subprocess.
    Cli,
    /// TCP socket.
    Tcp,
    /// UDP socket.
    Udp,
    /// Filesystem document.
    Text,
    /// Model-Context-Protocol server.
    Mcp,
    /// gNMI gRPC.
    Gnmi,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransportKind::Http => "http",
            TransportKind::StreamableHttp => "streamable_http",
            TransportKind::Sse => "sse",
            TransportKind::WebSocket => "websocket",
            TransportKind::Cli => "cli",
            TransportKind::Tcp => "tcp",
            TransportKind::Udp => "udp",
            TransportKind::Text => "text",
            TransportKind::Mcp => "mcp",
            TransportKind::Gnmi => "gnmi",
        };
        f.write_str(s)
    }
}

/// HTTP method used by HTTP-family call templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
    /// PATCH
    Patch,
}

impl Default for HttpMethod {
    fn default() -> Self {
        HttpMethod::Get
    }
}

fn default_content_type() -> String {
    "application/json".to_string()
}

/// TCP/UDP framing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingStrategy {
    /// A fixed-width byte count precedes the payload.
    LengthPrefix,
    /// The payload is terminated by a delimiter sequence.
    Delimiter,
    /// The payload is exactly `fixed_message_length` bytes.
    FixedLength,
    /// Read until connection close or `max_response_size` bytes.
    Stream,
}

/// Endianness of a TCP length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    /// Big-endian (network byte order).
    Big,
    /// Little-endian.
    Little,
}

/// Request body encoding for TCP/UDP call templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestDataFormat {
    /// JSON-encode the argument map.
    Json,
    /// Render `request_data_template` with `UTCP_ARG_<name>_UTCP_ARG`
    /// placeholders, falling back to whitespace-joined values.
    Text,
}

/// Response shape a WebSocket call template expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Parse the text message as JSON.
    Json,
    /// Treat the text message as a plain string.
    Text,
    /// Return the message exactly as received.
    Raw,
    /// No format negotiated; decode opportunistically.
    Unspecified,
}

/// A single step of a CLI call template's `commands` script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliCommandStep {
    /// The command line for this step, with `UTCP_ARG_<name>_UTCP_END` and
    /// (for steps after the first) `CMD_<i>_OUTPUT` placeholders.
    pub command: String,
    /// Whether this step's stdout contributes to the final returned payload.
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub append_to_final_output: bool,
}

fn default_true() -> bool {
    true
}

fn is_true(b: &bool) -> bool {
    *b
}

/// A configured MCP server entry (stdio or HTTP) inside an `mcp` call
/// template's `config.mcpServers` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpServerConfig {
    /// Launch a local subprocess speaking MCP over stdio.
    Stdio {
        /// Executable to launch.
        command: String,
        /// Command-line arguments.
        #[serde(default)]
        args: Vec<String>,
        /// Extra environment variables merged over the process environment.
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    /// Connect to a remote MCP server over HTTP.
    Http {
        /// Server URL.
        url: String,
    },
    /// Connect to a remote MCP server over SSE.
    Sse {
        /// Server URL.
        url: String,
    },
}

/// MCP call template configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct McpConfig {
    /// Configured servers, keyed by server name.
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
}

/// The tagged union over transport kinds.
///
/// Every variant carries `name` (sanitized on registration) and the optional
/// `auth` / `allowed_communication_protocols` fields common to all call
/// templates, plus kind-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call_template_type", rename_all = "snake_case")]
pub enum CallTemplate {
    /// HTTP request/response.
    Http {
        /// Call template identifier.
        name: String,
        /// Target URL, may contain `{param}` path placeholders.
        url: String,
        /// HTTP method.
        #[serde(default)]
        http_method: HttpMethod,
        /// Default content type when a body is present but `Content-Type`
        /// is unset.
        #[serde(default = "default_content_type")]
        content_type: String,
        /// Static headers merged into every request.
        #[serde(default)]
        headers: BTreeMap<String, String>,
        /// Argument name that supplies the request body.
        #[serde(skip_serializing_if = "Option::is_none")]
        body_field: Option<String>,
        /// Argument names routed into headers instead of query/body.
        #[serde(default)]
        header_fields: Vec<String>,
        /// Credential descriptor, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        auth: Option<Auth>,
        /// Transport kinds a manual registered through this template may
        /// expose tools for. Empty/absent defaults to `{http}`.
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        allowed_communication_protocols: BTreeSet<TransportKind>,
    },
    /// HTTP streamable / chunked transport.
    StreamableHttp {
        /// Call template identifier.
        name: String,
        /// Target URL.
        url: String,
        /// HTTP method.
        #[serde(default)]
        http_method: HttpMethod,
        /// Default content type.
        #[serde(default = "default_content_type")]
        content_type: String,
        /// Static headers.
        #[serde(default)]
        headers: BTreeMap<String, String>,
        /// Argument name that supplies the request body.
        #[serde(skip_serializing_if = "Option::is_none")]
        body_field: Option<String>,
        /// Argument names routed into headers.
        #[serde(default)]
        header_fields: Vec<String>,
        /// Byte size of raw chunks when decoding `application/octet-stream`.
        #[serde(default = "default_chunk_size")]
        chunk_size: usize,
        /// Request timeout in milliseconds.
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
        /// Credential descriptor, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        auth: Option<Auth>,
        /// Allowed transport kinds.
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        allowed_communication_protocols: BTreeSet<TransportKind>,
    },
    /// Server-Sent Events.
    Sse {
        /// Call template identifier.
        name: String,
        /// Target URL.
        url: String,
        /// Static headers.
        #[serde(default)]
        headers: BTreeMap<String, String>,
        /// Argument name that supplies the request body (POST calls only).
        #[serde(skip_serializing_if = "Option::is_none")]
        body_field: Option<String>,
        /// Argument names routed into headers.
        #[serde(default)]
        header_fields: Vec<String>,
        /// When set, only events whose `event:` field matches are yielded.
        #[serde(skip_serializing_if = "Option::is_none")]
        event_type: Option<String>,
        /// Credential descriptor, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        auth: Option<Auth>,
        /// Allowed transport kinds.
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        allowed_communication_protocols: BTreeSet<TransportKind>,
    },
    /// WebSocket.
    WebSocket {
        /// Call template identifier.
        name: String,
        /// Target URL (`ws://` or `wss://`).
        url: String,
        /// Optional WebSocket subprotocol.
        #[serde(skip_serializing_if = "Option::is_none")]
        protocol: Option<String>,
        /// Whether to keep the connection alive between calls.
        #[serde(default = "default_true")]
        keep_alive: bool,
        /// Static headers sent during the handshake.
        #[serde(default)]
        headers: BTreeMap<String, String>,
        /// Optional message template with `${arg}` placeholders; raw JSON
        /// args are sent when absent.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<Value>,
        /// Expected response shape.
        #[serde(default)]
        response_format: ResponseFormat,
        /// Per-message timeout in milliseconds.
        #[serde(default = "default_ws_timeout")]
        timeout: u64,
        /// Credential descriptor, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        auth: Option<Auth>,
        /// Allowed transport kinds.
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        allowed_communication_protocols: BTreeSet<TransportKind>,
    },
    /// Local CLI subprocess.
    Cli {
        /// Call template identifier.
        name: String,
        /// Multi-step command script. Mutually exclusive with
        /// `command_name` (legacy single-string form); the transport
        /// normalizes the legacy form into a single-step script.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        commands: Vec<CliCommandStep>,
        /// Legacy single command string form.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command_name: Option<String>,
        /// Extra environment variables merged over the process environment.
        #[serde(default)]
        env_vars: BTreeMap<String, String>,
        /// Working directory for the subprocess.
        #[serde(skip_serializing_if = "Option::is_none")]
        working_dir: Option<String>,
        /// Credential descriptor, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        auth: Option<Auth>,
        /// Allowed transport kinds.
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        allowed_communication_protocols: BTreeSet<TransportKind>,
    },
    /// TCP socket.
    Tcp {
        /// Call template identifier.
        name: String,
        /// Target host.
        host: String,
        /// Target port.
        port: u16,
        /// Framing strategy.
        framing_strategy: FramingStrategy,
        /// Byte width of a length prefix (1, 2, 4, or 8).
        #[serde(default = "default_length_prefix_bytes")]
        length_prefix_bytes: u8,
        /// Endianness of the length prefix.
        #[serde(default)]
        length_prefix_endian: EndianDefault,
        /// Delimiter bytes (with `\n`/`\x00` escape handling) for
        /// `delimiter` framing.
        #[serde(skip_serializing_if = "Option::is_none")]
        message_delimiter: Option<String>,
        /// Exact payload length for `fixed_length` framing.
        #[serde(skip_serializing_if = "Option::is_none")]
        fixed_message_length: Option<usize>,
        /// Maximum bytes read for `stream` framing.
        #[serde(skip_serializing_if = "Option::is_none")]
        max_response_size: Option<usize>,
        /// Request body encoding.
        #[serde(default)]
        request_data_format: RequestDataFormatDefault,
        /// Text template for `text`-format requests.
        #[serde(skip_serializing_if = "Option::is_none")]
        request_data_template: Option<String>,
        /// Text encoding used to decode the response; `None` returns raw
        /// bytes.
        #[serde(skip_serializing_if = "Option::is_none")]
        response_byte_format: Option<String>,
        /// Connection timeout in milliseconds.
        #[serde(default = "default_tcp_timeout")]
        timeout: u64,
        /// Credential descriptor, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        auth: Option<Auth>,
        /// Allowed transport kinds.
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        allowed_communication_protocols: BTreeSet<TransportKind>,
    },
    /// UDP socket.
    Udp {
        /// Call template identifier.
        name: String,
        /// Target host.
        host: String,
        /// Target port.
        port: u16,
        /// Number of response datagrams to collect (>= 1).
        #[serde(default = "default_one")]
        number_of_response_datagrams: usize,
        /// Request body encoding.
        #[serde(default)]
        request_data_format: RequestDataFormatDefault,
        /// Text template for `text`-format requests.
        #[serde(skip_serializing_if = "Option::is_none")]
        request_data_template: Option<String>,
        /// Text encoding used to decode the response; `None` returns raw
        /// bytes.
        #[serde(skip_serializing_if = "Option::is_none")]
        response_byte_format: Option<String>,
        /// Socket timeout in milliseconds.
        #[serde(default = "default_tcp_timeout")]
        timeout: u64,
        /// Credential descriptor, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        auth: Option<Auth>,
        /// Allowed transport kinds.
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        allowed_communication_protocols: BTreeSet<TransportKind>,
    },
    /// Filesystem document.
    Text {
        /// Call template identifier.
        name: String,
        /// File path, resolved against the client's `root_dir` when
        /// relative.
        file_path: String,
        /// Credential descriptor, if any (unused by this transport but
        /// present for structural symmetry).
        #[serde(skip_serializing_if = "Option::is_none")]
        auth: Option<Auth>,
        /// Allowed transport kinds.
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        allowed_communication_protocols: BTreeSet<TransportKind>,
    },
    /// Model-Context-Protocol server.
    Mcp {
        /// Call template identifier.
        name: String,
        /// Configured MCP servers.
        config: McpConfig,
        /// Whether to additionally expose each server's resources as
        /// `resource_<name>` pseudo-tools.
        #[serde(default)]
        register_resources_as_tools: bool,
        /// Credential descriptor, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        auth: Option<Auth>,
        /// Allowed transport kinds.
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        allowed_communication_protocols: BTreeSet<TransportKind>,
    },
    /// gNMI gRPC.
    Gnmi {
        /// Call template identifier.
        name: String,
        /// `host:port` gNMI target.
        target: String,
        /// Whether to use TLS (insecure channels are only permitted for
        /// localhost/loopback targets).
        #[serde(default)]
        use_tls: bool,
        /// Generated gRPC stub module name.
        stub_module: String,
        /// Generated gRPC message module name.
        message_module: String,
        /// Which of the four virtual tools this template targets
        /// (`capabilities`, `get`, `set`, `subscribe`).
        #[serde(skip_serializing_if = "Option::is_none")]
        operation: Option<String>,
        /// Static metadata sent with every RPC.
        #[serde(default)]
        metadata: BTreeMap<String, String>,
        /// Argument names additionally copied into metadata when present.
        #[serde(default)]
        metadata_fields: Vec<String>,
        /// Credential descriptor, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        auth: Option<Auth>,
        /// Allowed transport kinds.
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        allowed_communication_protocols: BTreeSet<TransportKind>,
    },
}

// serde can't derive `Default` for unit-like wrapper enums used purely to
// give `#[serde(default)]` a value; these newtype-free helpers keep the
// struct definitions above readable while still deriving `Default`.
pub use crate::call_template::defaults::{EndianDefault, RequestDataFormatDefault};

mod defaults {
    use super::{Endian, RequestDataFormat};
    use serde::{Deserialize, Serialize};

    /// [`Endian`] with a `Default` impl (`Big`), used only for
    /// `#[serde(default)]` fields.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct EndianDefault(pub Endian);

    impl Default for EndianDefault {
        fn default() -> Self {
            EndianDefault(Endian::Big)
        }
    }

    /// [`RequestDataFormat`] with a `Default` impl (`Json`), used only for
    /// `#[serde(default)]` fields.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct RequestDataFormatDefault(pub RequestDataFormat);

    impl Default for RequestDataFormatDefault {
        fn default() -> Self {
            RequestDataFormatDefault(RequestDataFormat::Json)
        }
    }
}

impl Default for ResponseFormat {
    fn default() -> Self {
        ResponseFormat::Unspecified
    }
}

fn default_chunk_size() -> usize {
    8192
}

fn default_ws_timeout() -> u64 {
    30_000
}

fn default_tcp_timeout() -> u64 {
    30_000
}

fn default_length_prefix_bytes() -> u8 {
    4
}

fn default_one() -> usize {
    1
}

impl CallTemplate {
    /// The identifier field common to every variant.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            CallTemplate::Http { name, .. }
            | CallTemplate::StreamableHttp { name, .. }
            | CallTemplate::Sse { name, .. }
            | CallTemplate::WebSocket { name, .. }
            | CallTemplate::Cli { name, .. }
            | CallTemplate::Tcp { name, .. }
            | CallTemplate::Udp { name, .. }
            | CallTemplate::Text { name, .. }
            | CallTemplate::Mcp { name, .. }
            | CallTemplate::Gnmi { name, .. } => name,
        }
    }

    /// Set the identifier field common to every variant.
    pub fn set_name(&mut self, new_name: impl Into<String>) {
        let new_name = new_name.into();
        match self {
            CallTemplate::Http { name, .. }
            | CallTemplate::StreamableHttp { name, .. }
            | CallTemplate::Sse { name, .. }
            | CallTemplate::WebSocket { name, .. }
            | CallTemplate::Cli { name, .. }
            | CallTemplate::Tcp { name, .. }
            | CallTemplate::Udp { name, .. }
            | CallTemplate::Text { name, .. }
            | CallTemplate::Mcp { name, .. }
            | CallTemplate::Gnmi { name, .. } => *name = new_name,
        }
    }

    /// The transport kind this template dispatches through.
    #[must_use]
    pub fn kind(&self) -> TransportKind {
        match self {
            CallTemplate::Http { .. } => TransportKind::Http,
            CallTemplate::StreamableHttp { .. } => TransportKind::StreamableHttp,
            CallTemplate::Sse { .. } => TransportKind::Sse,
            CallTemplate::WebSocket { .. } => TransportKind::WebSocket,
            CallTemplate::Cli { .. } => TransportKind::Cli,
            CallTemplate::Tcp { .. } => TransportKind::Tcp,
            CallTemplate::Udp { .. } => TransportKind::Udp,
            CallTemplate::Text { .. } => TransportKind::Text,
            CallTemplate::Mcp { .. } => TransportKind::Mcp,
            CallTemplate::Gnmi { .. } => TransportKind::Gnmi,
        }
    }

    /// The credential descriptor, if any.
    #[must_use]
    pub fn auth(&self) -> Option<&Auth> {
        match self {
            CallTemplate::Http { auth, .. }
            | CallTemplate::StreamableHttp { auth, .. }
            | CallTemplate::Sse { auth, .. }
            | CallTemplate::WebSocket { auth, .. }
            | CallTemplate::Cli { auth, .. }
            | CallTemplate::Tcp { auth, .. }
            | CallTemplate::Udp { auth, .. }
            | CallTemplate::Text { auth, .. }
            | CallTemplate::Mcp { auth, .. }
            | CallTemplate::Gnmi { auth, .. } => auth.as_ref(),
        }
    }

    /// The set of transport kinds a manual registered through this template
    /// may expose tools for, defaulting to `{self.kind()}` when empty.
    #[must_use]
    pub fn allowed_communication_protocols(&self) -> BTreeSet<TransportKind> {
        let raw = match self {
            CallTemplate::Http {
                allowed_communication_protocols,
                ..
            }
            | CallTemplate::StreamableHttp {
                allowed_communication_protocols,
                ..
            }
            | CallTemplate::Sse {
                allowed_communication_protocols,
                ..
            }
            | CallTemplate::WebSocket {
                allowed_communication_protocols,
                ..
            }
            | CallTemplate::Cli {
                allowed_communication_protocols,
                ..
            }
            | CallTemplate::Tcp {
                allowed_communication_protocols,
                ..
            }
            | CallTemplate::Udp {
                allowed_communication_protocols,
                ..
            }
            | CallTemplate::Text {
                allowed_communication_protocols,
                ..
            }
            | CallTemplate::Mcp {
                allowed_communication_protocols,
                ..
            }
            | CallTemplate::Gnmi {
                allowed_communication_protocols,
                ..
            } => allowed_communication_protocols,
        };
        if raw.is_empty() {
            BTreeSet::from([self.kind()])
        } else {
            raw.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_template_tags_on_call_template_type() {
        let tpl = CallTemplate::Http {
            name: "api".into(),
            url: "https://ex.example/v1".into(),
            http_method: HttpMethod::Post,
            content_type: default_content_type(),
            headers: BTreeMap::new(),
            body_field: None,
            header_fields: vec![],
            auth: None,
            allowed_communication_protocols: BTreeSet::new(),
        };
        let json = serde_json::to_value(&tpl).unwrap();
        assert_eq!(json["call_template_type"], "http");
        assert_eq!(json["http_method"], "POST");
    }

    #[test]
    fn empty_allowed_protocols_defaults_to_own_kind() {
        let tpl = CallTemplate::Cli {
            name: "tool".into(),
            commands: vec![],
            command_name: Some("echo hi".into()),
            env_vars: BTreeMap::new(),
            working_dir: None,
            auth: None,
            allowed_communication_protocols: BTreeSet::new(),
        };
        assert_eq!(
            tpl.allowed_communication_protocols(),
            BTreeSet::from([TransportKind::Cli])
        );
    }
}
