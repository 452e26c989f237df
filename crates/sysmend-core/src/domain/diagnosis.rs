//! Structured diagnosis and its schema-validating decode step.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use solution_index::Category;
use tracing::warn;

use super::error::DiagnosisError;

/// Diagnosis status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisStatus {
    DefinitiveDiagnosis,
    NeedsInvestigation,
    CriticalRisk,
}

impl DiagnosisStatus {
    pub const ALL: [DiagnosisStatus; 3] = [
        DiagnosisStatus::DefinitiveDiagnosis,
        DiagnosisStatus::NeedsInvestigation,
        DiagnosisStatus::CriticalRisk,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DefinitiveDiagnosis => "definitive_diagnosis",
            Self::NeedsInvestigation => "needs_investigation",
            Self::CriticalRisk => "critical_risk",
        }
    }
}

impl std::fmt::Display for DiagnosisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one diagnostic attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub status: DiagnosisStatus,
    pub category: Category,
    /// Only present for `definitive_diagnosis`.
    pub root_cause: Option<String>,
    pub explanation: String,
}

impl DiagnosisResult {
    pub fn definitive(
        category: Category,
        root_cause: impl Into<String>,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            status: DiagnosisStatus::DefinitiveDiagnosis,
            category,
            root_cause: Some(root_cause.into()),
            explanation: explanation.into(),
        }
    }

    pub fn inconclusive(category: Category, explanation: impl Into<String>) -> Self {
        Self {
            status: DiagnosisStatus::NeedsInvestigation,
            category,
            root_cause: None,
            explanation: explanation.into(),
        }
    }

    pub fn critical(category: Category, explanation: impl Into<String>) -> Self {
        Self {
            status: DiagnosisStatus::CriticalRisk,
            category,
            root_cause: None,
            explanation: explanation.into(),
        }
    }

    pub fn is_inconclusive(&self) -> bool {
        self.status == DiagnosisStatus::NeedsInvestigation
    }

    /// Retrieval query text: root cause first, then the explanation.
    pub fn query_text(&self) -> String {
        match &self.root_cause {
            Some(root) => format!("{root}\n{}", self.explanation),
            None => self.explanation.clone(),
        }
    }
}

/// JSON schema the inference provider must conform to.
pub fn diagnosis_schema() -> Value {
    let statuses: Vec<&str> = DiagnosisStatus::ALL.iter().map(|s| s.as_str()).collect();
    let categories: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
    json!({
        "type": "object",
        "properties": {
            "status": {
                "type": "string",
                "enum": statuses,
                "description": "definitive_diagnosis when evidence identifies the cause, needs_investigation when it is empty or contradictory, critical_risk when any fix is dangerous"
            },
            "category": {
                "type": "string",
                "enum": categories,
                "description": "Subsystem the fault belongs to"
            },
            "root_cause": {
                "type": ["string", "null"],
                "description": "Underlying condition; only for definitive_diagnosis"
            },
            "explanation": {
                "type": "string",
                "description": "Evidence and reasoning behind the diagnosis"
            }
        },
        "required": ["status", "category", "explanation"]
    })
}

/// Wire shape of a submitted diagnosis, before the cross-field checks.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DiagnosisWire {
    status: DiagnosisStatus,
    category: Category,
    #[serde(default)]
    root_cause: Option<String>,
    explanation: String,
}

/// Validate and decode a structured diagnosis.
///
/// Anything that does not match [`diagnosis_schema`] is a parse error.
pub fn decode_diagnosis(value: &Value) -> Result<DiagnosisResult, DiagnosisError> {
    let wire = DiagnosisWire::deserialize(value)
        .map_err(|e| DiagnosisError::Parse(format!("diagnosis does not match schema: {e}")))?;

    let explanation = wire.explanation.trim().to_string();
    if explanation.is_empty() {
        return Err(DiagnosisError::Parse("explanation is empty".to_string()));
    }

    let root_cause = wire
        .root_cause
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());

    let root_cause = match (wire.status, root_cause) {
        (DiagnosisStatus::DefinitiveDiagnosis, None) => {
            return Err(DiagnosisError::Parse(
                "definitive_diagnosis requires a root_cause".to_string(),
            ))
        }
        (DiagnosisStatus::DefinitiveDiagnosis, root) => root,
        (status, Some(root)) => {
            warn!(%status, root_cause = %root, "dropping root_cause from non-definitive diagnosis");
            None
        }
        (_, None) => None,
    };

    Ok(DiagnosisResult {
        status: wire.status,
        category: wire.category,
        root_cause,
        explanation,
    })
}
