//! Shared process-spawning helpers: argv splitting (POSIX on Unix, a
//! Windows-style splitter on Windows) and the `UTCP_ARG_<name>_UTCP_END`
//! placeholder substitution.

use std::collections::BTreeMap;
use std::process::Stdio;

use serde_json::Value;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use utcp_types::{UtcpError, UtcpResult};

/// Split a command line by POSIX shell-quoting rules on Unix, or a simpler
/// Windows-style splitter elsewhere.
pub(crate) fn split_command(line: &str) -> UtcpResult<Vec<String>> {
    #[cfg(windows)]
    {
        Ok(split_windows(line))
    }
    #[cfg(not(windows))]
    {
        shell_words::split(line).map_err(|e| UtcpError::CallFailure(format!("invalid command line {line:?}: {e}")))
    }
}

#[cfg(windows)]
fn split_windows(line: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Replace `UTCP_ARG_<name>_UTCP_END` in `command` with each argument's
/// value, JSON-encoding non-string values.
pub(crate) fn substitute_args(command: &str, args: &serde_json::Map<String, Value>) -> String {
    let mut out = command.to_string();
    for (name, value) in args {
        let placeholder = format!("UTCP_ARG_{name}_UTCP_END");
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out = out.replace(&placeholder, &rendered);
    }
    out
}

/// The outcome of running one subprocess: its exit status and both output
/// streams.
pub(crate) struct ProcessOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

async fn spawn_and_wait(mut cmd: Command, label: &str, timeout_ms: u64) -> UtcpResult<ProcessOutput> {
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.stdin(Stdio::null());

    let child = cmd
        .spawn()
        .map_err(|e| UtcpError::CallFailure(format!("spawning {label:?}: {e}")))?;

    let output = timeout(Duration::from_millis(timeout_ms), child.wait_with_output())
        .await
        .map_err(|_| UtcpError::CallFailure(format!("{label:?} timed out after {timeout_ms}ms")))?
        .map_err(|e| UtcpError::CallFailure(format!("waiting for {label:?}: {e}")))?;

    Ok(ProcessOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Spawn `argv[0]` directly with `argv[1..]` (no shell interposed), used
/// for discovery.
pub(crate) async fn run_direct(
    argv: &[String],
    env: &BTreeMap<String, String>,
    cwd: Option<&str>,
    timeout_ms: u64,
) -> UtcpResult<ProcessOutput> {
    let Some((program, rest)) = argv.split_first() else {
        return Err(UtcpError::CallFailure("empty command line".to_string()));
    };
    let mut cmd = Command::new(program);
    cmd.args(rest);
    cmd.envs(env);
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    spawn_and_wait(cmd, program, timeout_ms).await
}

/// Spawn `command`, routed through a shell so the command string may use
/// shell features (pipes, `$VAR` expansion of prior-step outputs); `env` is
/// merged over the process environment, `cwd` resolves relative to the
/// caller's working directory, and the whole run is capped at `timeout_ms`.
pub(crate) async fn run_shell(
    command: &str,
    env: &BTreeMap<String, String>,
    cwd: Option<&str>,
    timeout_ms: u64,
) -> UtcpResult<ProcessOutput> {
    let mut cmd = shell_command(command);
    cmd.envs(env);
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    spawn_and_wait(cmd, command, timeout_ms).await
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// Parse `text` as JSON if valid, otherwise return it unchanged as a JSON
/// string.
pub(crate) fn parse_or_raw(text: &str) -> Value {
    serde_json::from_str(text.trim()).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_string_and_non_string_args() {
        let mut args = serde_json::Map::new();
        args.insert("name".to_string(), Value::String("alice".to_string()));
        args.insert("count".to_string(), Value::from(3));
        let out = substitute_args(
            "greet --name UTCP_ARG_name_UTCP_END --count UTCP_ARG_count_UTCP_END",
            &args,
        );
        assert_eq!(out, "greet --name alice --count 3");
    }

    #[test]
    fn parse_or_raw_prefers_json() {
        assert_eq!(parse_or_raw(r#"{"a":1}"#), serde_json::json!({"a": 1}));
        assert_eq!(parse_or_raw("not json"), Value::String("not json".to_string()));
    }
}
