//! Corpus file loading and validation.

use std::path::Path;

use tracing::{debug, info};

use crate::error::IndexError;
use crate::record::SolutionRecord;
use crate::Result;

/// Read and validate a corpus file (JSON array of records).
pub fn load_corpus(path: &Path) -> Result<Vec<SolutionRecord>> {
    info!("Loading solutions from {}", path.display());
    let raw = std::fs::read_to_string(path)?;
    let records = parse_corpus(&raw)?;
    info!("Loaded {} solutions", records.len());
    Ok(records)
}

/// Parse and validate corpus JSON.
///
/// Positions in errors are zero-based, matching the `solution_<n>` ids.
pub fn parse_corpus(raw: &str) -> Result<Vec<SolutionRecord>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(raw)
        .map_err(|e| IndexError::InvalidCorpus(format!("expected a JSON array: {e}")))?;

    let mut records = Vec::with_capacity(values.len());
    for (position, value) in values.into_iter().enumerate() {
        let record: SolutionRecord =
            serde_json::from_value(value).map_err(|e| IndexError::InvalidRecord {
                position,
                reason: e.to_string(),
            })?;
        validate_record(position, &record)?;
        records.push(record);
    }
    debug!(count = records.len(), "corpus validated");
    Ok(records)
}

fn validate_record(position: usize, record: &SolutionRecord) -> Result<()> {
    let invalid = |reason: &str| IndexError::InvalidRecord {
        position,
        reason: reason.to_string(),
    };

    if record.error_trigger.trim().is_empty() {
        return Err(invalid("error_trigger must not be empty"));
    }
    if record.steps.is_empty() {
        return Err(invalid("steps must not be empty"));
    }
    if record.steps.iter().any(|s| s.trim().trim_start_matches('-').trim().is_empty()) {
        return Err(invalid("steps must not contain blank commands"));
    }
    if record.validation_command.trim().is_empty() {
        return Err(invalid("validation_command must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Category, RiskLevel};

    const ONE: &str = r#"[{
        "category": "storage",
        "error_trigger": "disk full",
        "context": "root partition exhausted",
        "solution_explanation": "remove cached packages",
        "risk_level": "low",
        "steps": ["apt-get clean"],
        "backup_required": false,
        "requires_reboot": false,
        "validation_command": "df -h / | check-threshold",
        "alternative_solution": null
    }]"#;

    #[test]
    fn test_parse_valid_corpus() {
        let records = parse_corpus(ONE).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, Category::Storage);
        assert_eq!(records[0].risk_level, RiskLevel::Low);
        assert!(records[0].alternative_solution.is_none());
    }

    #[test]
    fn test_alternative_solution_may_be_omitted() {
        let mut values: Vec<serde_json::Value> = serde_json::from_str(ONE).unwrap();
        values[0]
            .as_object_mut()
            .unwrap()
            .remove("alternative_solution");
        let raw = serde_json::to_string(&values).unwrap();
        assert_eq!(parse_corpus(&raw).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_risk_level_names_position() {
        let raw = ONE.replace("\"low\"", "\"extreme\"");
        match parse_corpus(&raw).unwrap_err() {
            IndexError::InvalidRecord { position, .. } => assert_eq!(position, 0),
            other => panic!("expected InvalidRecord, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_steps_rejected() {
        let raw = ONE.replace("[\"apt-get clean\"]", "[]");
        let err = parse_corpus(&raw).unwrap_err();
        assert!(err.to_string().contains("steps must not be empty"));
    }

    #[test]
    fn test_not_an_array_rejected() {
        assert!(matches!(
            parse_corpus("{}").unwrap_err(),
            IndexError::InvalidCorpus(_)
        ));
    }
}
