//! Operator confirmation for solutions that must not run automatically.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solution_index::{Category, RiskLevel};

use crate::domain::DiagnosisResult;
use crate::retrieval::SelectedSolution;

/// Everything an operator needs to approve or decline a solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub solution_id: String,
    pub category: Category,
    pub risk_level: RiskLevel,
    pub score: f32,
    pub diagnosis: DiagnosisResult,
    pub explanation: String,
    pub steps: Vec<String>,
    pub backup_required: bool,
    pub requires_reboot: bool,
    pub alternative_solution: Option<String>,
}

impl ConfirmationRequest {
    pub fn new(selected: &SelectedSolution, diagnosis: &DiagnosisResult) -> Self {
        let record = &selected.solution.record;
        Self {
            solution_id: selected.solution.id.clone(),
            category: record.category,
            risk_level: record.risk_level,
            score: selected.score,
            diagnosis: diagnosis.clone(),
            explanation: record.solution_explanation.clone(),
            steps: record.steps.clone(),
            backup_required: record.backup_required,
            requires_reboot: record.requires_reboot,
            alternative_solution: record.alternative_solution.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ConfirmationDecision {
    Granted,
    Denied { reason: String },
}

/// External approval step. The orchestrator bounds each call with a timeout.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, request: &ConfirmationRequest) -> ConfirmationDecision;
}

/// Denies everything. Used when no operator is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl ConfirmationGate for DenyAll {
    async fn confirm(&self, request: &ConfirmationRequest) -> ConfirmationDecision {
        ConfirmationDecision::Denied {
            reason: format!(
                "{} is {} risk and no operator is available to confirm it",
                request.solution_id, request.risk_level
            ),
        }
    }
}
