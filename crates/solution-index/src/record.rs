//! Solution corpus records.
//!
//! A [`SolutionRecord`] is one entry of the corpus file as authored; a
//! [`Solution`] is the same record after indexing, carrying its stable
//! `solution_<n>` id. [`EntryMetadata`] is the flattened form persisted
//! next to each embedding (steps encoded as a JSON string).

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// Fault category shared by corpus records and diagnoses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    PackageManager,
    Network,
    Storage,
    SystemService,
    Permission,
    Unknown,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::PackageManager,
        Category::Network,
        Category::Storage,
        Category::SystemService,
        Category::Permission,
        Category::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PackageManager => "package_manager",
            Self::Network => "network",
            Self::Storage => "storage",
            Self::SystemService => "system_service",
            Self::Permission => "permission",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

/// Risk classification gating automatic execution.
///
/// Ordering is meaningful: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Critical solutions never run without an explicit confirmation.
    pub fn requires_confirmation(self) -> bool {
        matches!(self, Self::Critical)
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// One remediation record as it appears in the corpus file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionRecord {
    pub category: Category,
    pub error_trigger: String,
    pub context: String,
    pub solution_explanation: String,
    pub risk_level: RiskLevel,
    pub steps: Vec<String>,
    pub backup_required: bool,
    pub requires_reboot: bool,
    pub validation_command: String,
    #[serde(default)]
    pub alternative_solution: Option<String>,
}

impl SolutionRecord {
    /// Text that gets embedded: trigger, context and explanation, one per line.
    pub fn document_text(&self) -> String {
        format!(
            "{}\n{}\n{}",
            self.error_trigger, self.context, self.solution_explanation
        )
    }
}

/// Stable id for the record at `seq` in the corpus.
pub fn solution_id(seq: usize) -> String {
    format!("solution_{seq}")
}

/// An indexed, immutable solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub id: String,
    #[serde(flatten)]
    pub record: SolutionRecord,
}

impl Solution {
    pub fn new(seq: usize, record: SolutionRecord) -> Self {
        Self {
            id: solution_id(seq),
            record,
        }
    }

    pub fn category(&self) -> Category {
        self.record.category
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.record.risk_level
    }
}

/// Flat metadata stored alongside each embedding on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub category: Category,
    pub error_trigger: String,
    pub context: String,
    pub solution_explanation: String,
    pub risk_level: RiskLevel,
    /// JSON-encoded `Vec<String>`.
    pub steps: String,
    pub backup_required: bool,
    pub requires_reboot: bool,
    pub validation_command: String,
    pub alternative_solution: Option<String>,
}

impl EntryMetadata {
    pub fn from_record(record: &SolutionRecord) -> Result<Self, IndexError> {
        Ok(Self {
            category: record.category,
            error_trigger: record.error_trigger.clone(),
            context: record.context.clone(),
            solution_explanation: record.solution_explanation.clone(),
            risk_level: record.risk_level,
            steps: serde_json::to_string(&record.steps)?,
            backup_required: record.backup_required,
            requires_reboot: record.requires_reboot,
            validation_command: record.validation_command.clone(),
            alternative_solution: record.alternative_solution.clone(),
        })
    }

    pub fn to_record(&self) -> Result<SolutionRecord, IndexError> {
        Ok(SolutionRecord {
            category: self.category,
            error_trigger: self.error_trigger.clone(),
            context: self.context.clone(),
            solution_explanation: self.solution_explanation.clone(),
            risk_level: self.risk_level,
            steps: serde_json::from_str(&self.steps)?,
            backup_required: self.backup_required,
            requires_reboot: self.requires_reboot,
            validation_command: self.validation_command.clone(),
            alternative_solution: self.alternative_solution.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk_full() -> SolutionRecord {
        SolutionRecord {
            category: Category::Storage,
            error_trigger: "disk full".into(),
            context: "root partition at 100%".into(),
            solution_explanation: "clean the apt cache".into(),
            risk_level: RiskLevel::Low,
            steps: vec!["apt-get clean".into(), "journalctl --vacuum-size=100M".into()],
            backup_required: false,
            requires_reboot: false,
            validation_command: "df -h / | check-threshold".into(),
            alternative_solution: None,
        }
    }

    #[test]
    fn test_risk_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert!(RiskLevel::Critical.requires_confirmation());
        assert!(!RiskLevel::High.requires_confirmation());
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("system_service".parse::<Category>().unwrap(), Category::SystemService);
        assert!("kernel".parse::<Category>().is_err());
    }

    #[test]
    fn test_document_text_joins_three_fields() {
        assert_eq!(
            disk_full().document_text(),
            "disk full\nroot partition at 100%\nclean the apt cache"
        );
    }

    #[test]
    fn test_metadata_encodes_steps_as_string() {
        let meta = EntryMetadata::from_record(&disk_full()).unwrap();
        assert_eq!(
            meta.steps,
            r#"["apt-get clean","journalctl --vacuum-size=100M"]"#
        );
        assert_eq!(meta.to_record().unwrap(), disk_full());
    }

    #[test]
    fn test_solution_serializes_flat() {
        let value = serde_json::to_value(Solution::new(7, disk_full())).unwrap();
        assert_eq!(value["id"], "solution_7");
        assert_eq!(value["category"], "storage");
        assert_eq!(value["risk_level"], "low");
    }
}
