//! Parsing a (possibly server-qualified) tool name back into its owning
//! server and local name.

use std::collections::BTreeMap;

use utcp_types::call_template::McpServerConfig;

/// Split `tool_name` into an explicit server name (when its leading
/// `<server>.` segment names a configured server) and the remaining local
/// name. When no segment matches a configured server, the server is left
/// unresolved so the caller can probe every configured server's tool list.
#[must_use]
pub fn split_server_prefix<'a>(
    tool_name: &'a str,
    servers: &BTreeMap<String, McpServerConfig>,
) -> (Option<&'a str>, &'a str) {
    if let Some((maybe_server, rest)) = tool_name.split_once('.')
        && servers.contains_key(maybe_server)
    {
        return (Some(maybe_server), rest);
    }
    (None, tool_name)
}

/// The pseudo-tool name prefix for a resource.
pub const RESOURCE_TOOL_PREFIX: &str = "resource_";

#[cfg(test)]
mod tests {
    use super::*;

    fn servers() -> BTreeMap<String, McpServerConfig> {
        let mut m = BTreeMap::new();
        m.insert(
            "files".to_string(),
            McpServerConfig::Http { url: "http://localhost:9000".into() },
        );
        m
    }

    #[test]
    fn splits_on_known_server_prefix() {
        let (server, name) = split_server_prefix("files.read", &servers());
        assert_eq!(server, Some("files"));
        assert_eq!(name, "read");
    }

    #[test]
    fn leaves_unresolved_when_prefix_is_not_a_server() {
        let (server, name) = split_server_prefix("read", &servers());
        assert_eq!(server, None);
        assert_eq!(name, "read");
    }
}
