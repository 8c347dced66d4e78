//! Manual-name sanitization shared by the client core (C6) and the OpenAPI
//! converter (C4).

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
///
/// Idempotent: `sanitize_name(sanitize_name(s)) == sanitize_name(s)`, since
/// the output alphabet is a subset of the allowed characters.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_invalid_characters() {
        assert_eq!(sanitize_name("api.v1"), "api_v1");
        assert_eq!(sanitize_name("my-manual!"), "my_manual_");
    }

    #[test]
    fn is_idempotent() {
        for s in ["api.v1", "already_clean", "weird  spaces", ""] {
            let once = sanitize_name(s);
            let twice = sanitize_name(&once);
            assert_eq!(once, twice);
        }
    }
}
