//! Tool-augmented diagnostic loop.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solution_index::Category;
use tracing::{debug, info, warn};

use super::capability::{CapabilityRegistry, CapabilitySpec, SUBMIT_DIAGNOSIS_TOOL};
use super::inference::{InferenceProvider, Message, ModelTurn, OutputSchema};
use super::prompt::{INVESTIGATE_PROMPT, SUBMIT_DIAGNOSIS_DESCRIPTION, SYSTEM_PROMPT};
use crate::domain::{decode_diagnosis, diagnosis_schema, DiagnosisError, DiagnosisResult, Issue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model turns allowed in one diagnostic attempt.
    pub max_tool_rounds: u32,
    /// Extra evidence prompts after a needs_investigation answer.
    pub max_investigation_rounds: u32,
    pub inference_timeout_ms: u64,
    pub tool_timeout_ms: u64,
    pub syslog_path: String,
    pub default_log_lines: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 8,
            max_investigation_rounds: 1,
            inference_timeout_ms: 120_000,
            tool_timeout_ms: 30_000,
            syslog_path: "/var/log/syslog".to_string(),
            default_log_lines: 50,
        }
    }
}

impl AgentConfig {
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }
}

/// Produces exactly one [`DiagnosisResult`] per call, or an error.
pub struct DiagnosticAgent {
    provider: Arc<dyn InferenceProvider>,
    registry: Arc<CapabilityRegistry>,
    config: AgentConfig,
}

impl DiagnosticAgent {
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        registry: Arc<CapabilityRegistry>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    fn output_schema() -> OutputSchema {
        OutputSchema {
            name: SUBMIT_DIAGNOSIS_TOOL.to_string(),
            schema: diagnosis_schema(),
        }
    }

    fn advertised_tools(&self, schema: &OutputSchema) -> Vec<CapabilitySpec> {
        let mut tools = self.registry.specs();
        tools.push(CapabilitySpec {
            name: SUBMIT_DIAGNOSIS_TOOL.to_string(),
            description: SUBMIT_DIAGNOSIS_DESCRIPTION.to_string(),
            parameters: schema.schema.clone(),
        });
        tools
    }

    pub async fn diagnose(&self, issue: &Issue) -> Result<DiagnosisResult, DiagnosisError> {
        let schema = Self::output_schema();
        let tools = self.advertised_tools(&schema);
        let timeout = self.config.inference_timeout();
        let mut conversation = vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(issue.prompt_text()),
        ];
        let mut investigations = 0;

        for round in 1..=self.config.max_tool_rounds {
            let turn = tokio::time::timeout(
                timeout,
                self.provider.complete(&conversation, &tools, &schema),
            )
            .await
            .map_err(|_| DiagnosisError::Timeout {
                timeout_ms: self.config.inference_timeout_ms,
            })??;

            let answer = match turn {
                ModelTurn::Final(value) => value,
                ModelTurn::ToolCalls(calls) => {
                    if let Some(submit) = calls.iter().find(|c| c.name == SUBMIT_DIAGNOSIS_TOOL) {
                        submit.arguments.clone()
                    } else {
                        debug!(round, calls = calls.len(), "running inspection tools");
                        // Independent calls run concurrently; all are joined
                        // before the next model turn.
                        let outputs = join_all(calls.iter().map(|c| self.registry.invoke(c))).await;
                        conversation.push(Message::assistant_tool_calls(calls.clone()));
                        for (call, output) in calls.iter().zip(outputs) {
                            conversation.push(Message::tool(&call.name, output));
                        }
                        continue;
                    }
                }
            };

            let diagnosis = decode_diagnosis(&answer)?;
            if diagnosis.is_inconclusive()
                && investigations < self.config.max_investigation_rounds
                && round < self.config.max_tool_rounds
            {
                investigations += 1;
                info!(round, investigations, "diagnosis inconclusive; gathering more evidence");
                conversation.push(Message::assistant(answer_text(&answer)));
                conversation.push(Message::user(INVESTIGATE_PROMPT));
                continue;
            }

            info!(
                status = %diagnosis.status,
                category = %diagnosis.category,
                rounds = round,
                "diagnosis produced"
            );
            return Ok(diagnosis);
        }

        warn!(
            max_tool_rounds = self.config.max_tool_rounds,
            "tool rounds exhausted without a final diagnosis"
        );
        Ok(DiagnosisResult::inconclusive(
            issue.category.unwrap_or(Category::Unknown),
            format!(
                "No conclusive diagnosis after {} inference rounds; evidence gathering was exhausted.",
                self.config.max_tool_rounds
            ),
        ))
    }
}

fn answer_text(answer: &Value) -> String {
    serde_json::to_string(answer).unwrap_or_default()
}
