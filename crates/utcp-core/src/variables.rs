//! `$VAR` / `${VAR}` substitution over an arbitrary JSON value graph.
//!
//! Resolution order for a bare variable name is: the config's own
//! `variables` map, then each configured [`VariableLoader`] in order, then
//! the process environment. Substitution inside a specific call template
//! first tries a manual-scoped name (every `_` in the sanitized manual
//! name doubled, then joined to the variable name with a single `_` —
//! e.g. `api_v1` + `BASE` -> `api__v1_BASE`) before falling back to the
//! bare name, so two manuals can both define `API_KEY` without colliding.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use utcp_types::{UtcpError, UtcpResult};

/// A pluggable source of variable values, consulted after the config's own
/// `variables` map and before the process environment.
///
/// Implemented by e.g. a dotenv-file reader; callers may stack several.
pub trait VariableLoader: Send + Sync + std::fmt::Debug {
    /// Look up `name`, returning `None` rather than erroring when absent —
    /// the substitutor falls through to the next source.
    fn get(&self, name: &str) -> Option<String>;
}

/// The variables a substitutor resolves against: the config's own map plus
/// an ordered list of [`VariableLoader`]s.
#[derive(Clone)]
pub struct VariableContext {
    /// Explicit `name -> value` overrides, checked first.
    pub variables: HashMap<String, String>,
    /// Pluggable loaders consulted in order after `variables`.
    pub loaders: Vec<Arc<dyn VariableLoader>>,
}

impl std::fmt::Debug for VariableContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableContext")
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .field("loaders", &self.loaders.len())
            .finish()
    }
}

impl Default for VariableContext {
    fn default() -> Self {
        Self {
            variables: HashMap::new(),
            loaders: Vec::new(),
        }
    }
}

impl VariableContext {
    /// An empty context: only the process environment will be consulted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `name` through variables, loaders, then the environment
    ///; `None` when none yields a value
    /// (step 4, `VariableNotFound`, is the caller's responsibility).
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<String> {
        if let Some(v) = self.variables.get(name) {
            return Some(v.clone());
        }
        for loader in &self.loaders {
            if let Some(v) = loader.get(name) {
                return Some(v);
            }
        }
        std::env::var(name).ok()
    }
}

/// Matches `$NAME` (terminated by a non-identifier character) or
/// `${NAME}`. Capture group 1 is the `${...}` form, group 2 the bare form.
static VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// Performs `$VAR`/`${VAR}` substitution over value graphs.
#[derive(Debug, Clone)]
pub struct VariableSubstitutor {
    /// Sanitized manual name used to build the scoped lookup prefix
    /// (every `_` doubled, then joined to `NAME` with a single `_`), or
    /// `None` for unscoped substitution.
    prefix: Option<String>,
}

impl VariableSubstitutor {
    /// A substitutor with no manual scoping: only bare names are tried.
    #[must_use]
    pub fn unscoped() -> Self {
        Self { prefix: None }
    }

    /// A substitutor scoped to `sanitized_manual_name`, trying
    /// `<prefix with every `_` doubled>_NAME` before falling back to bare
    /// `NAME`.
    #[must_use]
    pub fn scoped(sanitized_manual_name: impl Into<String>) -> Self {
        Self {
            prefix: Some(sanitized_manual_name.into()),
        }
    }

    /// The ordered candidate lookup keys for a referenced bare `name`:
    /// the scoped form first (if scoped), then the bare form. The scoped
    /// form doubles every `_` already in the prefix, then joins the
    /// variable name with a single `_`, so e.g. prefix `api_v1` + name
    /// `BASE` looks up `api__v1_BASE`.
    fn candidates(&self, name: &str) -> Vec<String> {
        match &self.prefix {
            Some(prefix) => vec![format!("{}_{name}", prefix.replace('_', "__")), name.to_string()],
            None => vec![name.to_string()],
        }
    }

    fn resolve_one(&self, name: &str, ctx: &VariableContext) -> UtcpResult<String> {
        for candidate in self.candidates(name) {
            if let Some(value) = ctx.resolve(&candidate) {
                return Ok(value);
            }
        }
        Err(UtcpError::VariableNotFound(name.to_string()))
    }

    /// Replace every `$NAME`/`${NAME}` in `value`, recursing through maps
    /// and arrays; non-string leaves pass through unchanged. Substitution is single-pass: the replacement text is
    /// never re-scanned for further variables.
    ///
    /// # Errors
    ///
    /// Returns [`UtcpError::VariableNotFound`] for the first referenced
    /// name that resolves through none of `ctx`'s sources.
    pub fn substitute(&self, value: &Value, ctx: &VariableContext) -> UtcpResult<Value> {
        match value {
            Value::String(s) => Ok(Value::String(self.substitute_str(s, ctx)?)),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.substitute(item, ctx)?);
                }
                Ok(Value::Array(out))
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.substitute(v, ctx)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    /// Substitute within a single string, without allocating a `Value`.
    ///
    /// # Errors
    ///
    /// Returns [`UtcpError::VariableNotFound`] for the first unresolved
    /// variable reference.
    pub fn substitute_str(&self, s: &str, ctx: &VariableContext) -> UtcpResult<String> {
        // Replace left-to-right, collecting the first resolution error.
        let mut err = None;
        let replaced = VAR_PATTERN.replace_all(s, |caps: &regex::Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match self.resolve_one(name, ctx) {
                Ok(v) => v,
                Err(e) => {
                    if err.is_none() {
                        err = Some(e);
                    }
                    String::new()
                }
            }
        });
        if let Some(e) = err {
            return Err(e);
        }
        Ok(replaced.into_owned())
    }

    /// Every namespaced variable name referenced anywhere in `value`,
    /// without failing on unresolved names —
    /// used to report which variables a manual/tool still requires.
    #[must_use]
    pub fn find_required(&self, value: &Value) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_required(value, &mut names);
        names
    }

    fn collect_required(&self, value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(s) => {
                for caps in VAR_PATTERN.captures_iter(s) {
                    let name = caps
                        .get(1)
                        .or_else(|| caps.get(2))
                        .map(|m| m.as_str())
                        .unwrap_or_default();
                    for candidate in self.candidates(name) {
                        if !out.contains(&candidate) {
                            out.push(candidate);
                        }
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.collect_required(item, out);
                }
            }
            Value::Object(map) => {
                for v in map.values() {
                    self.collect_required(v, out);
                }
            }
            _ => {}
        }
    }
}

/// A [`VariableLoader`] backed by a parsed dotenv file.
#[derive(Debug, Clone, Default)]
pub struct DotenvLoader {
    values: HashMap<String, String>,
}

impl DotenvLoader {
    /// Parse the dotenv file at `path`. Missing files yield an empty
    /// loader rather than an error — a dotenv loader is optional
    /// configuration, not a required one.
    ///
    /// # Errors
    ///
    /// Returns [`UtcpError::InvalidConfig`] when the file exists but
    /// cannot be parsed.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> UtcpResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let mut values = HashMap::new();
        for item in dotenvy::from_path_iter(path)
            .map_err(|e| UtcpError::InvalidConfig(format!("reading {}: {e}", path.display())))?
        {
            let (k, v) = item.map_err(|e| {
                UtcpError::InvalidConfig(format!("parsing {}: {e}", path.display()))
            })?;
            values.insert(k, v);
        }
        Ok(Self { values })
    }
}

impl VariableLoader for DotenvLoader {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(vars: &[(&str, &str)]) -> VariableContext {
        VariableContext {
            variables: vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            loaders: vec![],
        }
    }

    #[test]
    fn no_variables_round_trips() {
        let sub = VariableSubstitutor::unscoped();
        let c = ctx(&[]);
        assert_eq!(sub.substitute_str("plain string", &c).unwrap(), "plain string");
    }

    #[test]
    fn both_dollar_forms_resolve() {
        let sub = VariableSubstitutor::unscoped();
        let c = ctx(&[("BASE", "https://ex.example")]);
        assert_eq!(sub.substitute_str("$BASE/x", &c).unwrap(), "https://ex.example/x");
        assert_eq!(sub.substitute_str("${BASE}/x", &c).unwrap(), "https://ex.example/x");
    }

    #[test]
    fn unresolved_variable_errors() {
        let sub = VariableSubstitutor::unscoped();
        let c = ctx(&[]);
        let err = sub.substitute_str("$MISSING", &c).unwrap_err();
        assert!(matches!(err, UtcpError::VariableNotFound(name) if name == "MISSING"));
    }

    #[test]
    fn non_string_leaves_pass_through() {
        let sub = VariableSubstitutor::unscoped();
        let c = ctx(&[]);
        let v = serde_json::json!({"n": 1, "b": true, "z": null});
        assert_eq!(sub.substitute(&v, &c).unwrap(), v);
    }

    #[test]
    fn scoped_prefix_wins_over_bare_name() {
        // Scenario S2: manual "api.v1" sanitizes to "api_v1"; the scoped
        // key doubles the `_` already in the name and joins the variable
        // with a single `_`: "api__v1_BASE".
        let sub = VariableSubstitutor::scoped("api_v1");
        let c = ctx(&[
            ("api__v1_BASE", "https://ex.example"),
            ("BASE", "https://wrong.example"),
        ]);
        assert_eq!(sub.substitute_str("$BASE/x", &c).unwrap(), "https://ex.example/x");
    }

    #[test]
    fn scoped_falls_back_to_bare_name() {
        let sub = VariableSubstitutor::scoped("api_v1");
        let c = ctx(&[("KEY", "secret")]);
        assert_eq!(sub.substitute_str("$KEY", &c).unwrap(), "secret");
    }

    #[test]
    fn find_required_reports_scoped_name_without_failing() {
        let sub = VariableSubstitutor::scoped("api_v1");
        let v = serde_json::json!({"url": "$BASE/x", "key": "${KEY}"});
        let mut required = sub.find_required(&v);
        required.sort();
        assert_eq!(required, vec!["api__v1_BASE", "api__v1_KEY"]);
    }

    #[test]
    fn substitution_is_single_pass() {
        // A resolved value containing `$` is not re-scanned for variables.
        let sub = VariableSubstitutor::unscoped();
        let c = ctx(&[("A", "$B"), ("B", "boom")]);
        assert_eq!(sub.substitute_str("$A", &c).unwrap(), "$B");
    }

    #[derive(Debug)]
    struct StaticLoader(HashMap<String, String>);
    impl VariableLoader for StaticLoader {
        fn get(&self, name: &str) -> Option<String> {
            self.0.get(name).cloned()
        }
    }

    #[test]
    fn loader_consulted_after_variables_before_env() {
        let mut loader_values = HashMap::new();
        loader_values.insert("FROM_LOADER".to_string(), "loader-value".to_string());
        let context = VariableContext {
            variables: HashMap::new(),
            loaders: vec![Arc::new(StaticLoader(loader_values))],
        };
        let sub = VariableSubstitutor::unscoped();
        assert_eq!(sub.substitute_str("$FROM_LOADER", &context).unwrap(), "loader-value");
    }
}
