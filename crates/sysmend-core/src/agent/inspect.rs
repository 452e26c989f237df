//! Built-in read-only inspection capabilities.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use super::capability::{Capability, CapabilityError, CapabilityRegistry, CapabilitySpec};
use super::diagnostic::AgentConfig;
use crate::exec::{shell_quote, CommandOutput, CommandRunner};

pub const DISK_USAGE: &str = "get_disk_usage";
pub const RECENT_LOGS: &str = "read_recent_logs";
pub const SERVICE_STATUS: &str = "check_service_status";

pub const MAX_LOG_LINES: u64 = 2000;

fn is_valid_service_name(name: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9@._:-]+$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

/// Render command output as tool text.
///
/// With `nonzero_is_evidence`, a non-zero exit is still regular output
/// (`systemctl status` exits 3 for a stopped unit).
fn render(command: &str, output: &CommandOutput, nonzero_is_evidence: bool) -> String {
    if output.timed_out {
        return format!("Error: `{command}` timed out after {}ms", output.duration_ms);
    }
    match output.exit_code {
        Some(0) => {
            let text = output.combined();
            if text.is_empty() {
                "(no output)".to_string()
            } else {
                text
            }
        }
        Some(_) if nonzero_is_evidence => output.combined(),
        Some(code) => format!("Error: `{command}` exited with {code}:\n{}", output.combined()),
        None => format!("Error: `{command}` did not run: {}", output.combined()),
    }
}

/// `df -h`.
pub struct DiskUsage {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

#[async_trait]
impl Capability for DiskUsage {
    fn spec(&self) -> CapabilitySpec {
        CapabilitySpec {
            name: DISK_USAGE.to_string(),
            description: "Returns disk usage statistics for all mounted filesystems (df -h).".into(),
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn invoke(&self, _arguments: &Value) -> String {
        let command = "df -h";
        render(command, &self.runner.run(command, self.timeout).await, false)
    }
}

/// `tail -n <line_count> <syslog>`.
pub struct RecentLogs {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    syslog_path: String,
    default_lines: u64,
}

impl RecentLogs {
    fn line_count(&self, arguments: &Value) -> u64 {
        let requested = match &arguments["line_count"] {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        requested
            .unwrap_or(self.default_lines)
            .clamp(1, MAX_LOG_LINES)
    }
}

#[async_trait]
impl Capability for RecentLogs {
    fn spec(&self) -> CapabilitySpec {
        CapabilitySpec {
            name: RECENT_LOGS.to_string(),
            description: "Reads the last N lines of the system log.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "line_count": {
                        "type": "integer",
                        "description": format!("Number of lines to read (default {}, max {MAX_LOG_LINES})", self.default_lines)
                    }
                }
            }),
        }
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn invoke(&self, arguments: &Value) -> String {
        let command = format!(
            "tail -n {} {}",
            self.line_count(arguments),
            shell_quote(&self.syslog_path)
        );
        render(&command, &self.runner.run(&command, self.timeout).await, false)
    }
}

/// `systemctl status <service>`.
pub struct ServiceStatus {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

#[async_trait]
impl Capability for ServiceStatus {
    fn spec(&self) -> CapabilitySpec {
        CapabilitySpec {
            name: SERVICE_STATUS.to_string(),
            description: "Checks the status of a systemd service.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "service_name": {"type": "string", "description": "Unit name, e.g. nginx or systemd-resolved"}
                },
                "required": ["service_name"]
            }),
        }
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn invoke(&self, arguments: &Value) -> String {
        let Some(name) = arguments["service_name"].as_str().map(str::trim) else {
            return "Error: missing required argument 'service_name'".to_string();
        };
        if !is_valid_service_name(name) {
            return format!("Error: invalid service name '{name}'");
        }
        let command = format!("systemctl status {name} --no-pager");
        render(&command, &self.runner.run(&command, self.timeout).await, true)
    }
}

/// Registry holding the three built-in inspection capabilities.
pub fn standard_registry(
    runner: Arc<dyn CommandRunner>,
    config: &AgentConfig,
) -> Result<CapabilityRegistry, CapabilityError> {
    let timeout = config.tool_timeout();
    let mut registry = CapabilityRegistry::new(timeout);
    registry.register(Arc::new(DiskUsage {
        runner: runner.clone(),
        timeout,
    }))?;
    registry.register(Arc::new(RecentLogs {
        runner: runner.clone(),
        timeout,
        syslog_path: config.syslog_path.clone(),
        default_lines: config.default_log_lines,
    }))?;
    registry.register(Arc::new(ServiceStatus { runner, timeout }))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ToolCallRequest;
    use crate::fakes::FakeCommandRunner;

    fn registry(runner: Arc<FakeCommandRunner>) -> CapabilityRegistry {
        standard_registry(runner, &AgentConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_disk_usage_returns_stdout() {
        let runner = Arc::new(
            FakeCommandRunner::new().with_result("df -h", CommandOutput::ok("/dev/sda1 100% /")),
        );
        let out = registry(runner)
            .invoke(&ToolCallRequest::new(DISK_USAGE, json!({})))
            .await;
        assert_eq!(out, "/dev/sda1 100% /");
    }

    #[tokio::test]
    async fn test_log_line_count_defaults_and_clamps() {
        let runner = Arc::new(FakeCommandRunner::new());
        let reg = registry(runner.clone());
        reg.invoke(&ToolCallRequest::new(RECENT_LOGS, json!({}))).await;
        reg.invoke(&ToolCallRequest::new(RECENT_LOGS, json!({"line_count": 999_999})))
            .await;
        reg.invoke(&ToolCallRequest::new(RECENT_LOGS, json!({"line_count": "0"})))
            .await;
        assert_eq!(
            runner.commands(),
            vec![
                "tail -n 50 '/var/log/syslog'",
                "tail -n 2000 '/var/log/syslog'",
                "tail -n 1 '/var/log/syslog'",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_tail_is_error_text() {
        let runner = Arc::new(FakeCommandRunner::new().with_result(
            "tail -n 50 '/var/log/syslog'",
            CommandOutput::failed(1, "Permission denied"),
        ));
        let out = registry(runner)
            .invoke(&ToolCallRequest::new(RECENT_LOGS, json!({})))
            .await;
        assert!(out.starts_with("Error: "));
        assert!(out.contains("Permission denied"));
    }

    #[tokio::test]
    async fn test_service_name_is_validated() {
        let runner = Arc::new(FakeCommandRunner::new());
        let reg = registry(runner.clone());
        let out = reg
            .invoke(&ToolCallRequest::new(SERVICE_STATUS, json!({"service_name": "x; rm -rf /"})))
            .await;
        assert!(out.starts_with("Error: invalid service name"));
        assert!(runner.commands().is_empty());
    }

    #[tokio::test]
    async fn test_stopped_service_is_evidence_not_error() {
        let runner = Arc::new(FakeCommandRunner::new().with_result(
            "systemctl status nginx --no-pager",
            CommandOutput {
                exit_code: Some(3),
                stdout: "Active: inactive (dead)".into(),
                stderr: String::new(),
                timed_out: false,
                duration_ms: 4,
            },
        ));
        let out = registry(runner)
            .invoke(&ToolCallRequest::new(SERVICE_STATUS, json!({"service_name": "nginx"})))
            .await;
        assert_eq!(out, "Active: inactive (dead)");
    }
}
