use serde::{Deserialize, Serialize};
use solution_index::Category;

use super::error::FailureKind;

/// Failure output fed back into diagnosis is capped at this many chars.
pub const MAX_FAILURE_CONTEXT_CHARS: usize = 2000;

/// Context carried forward from a failed repair pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorFailure {
    pub pass: u32,
    pub category: Option<Category>,
    pub solution_id: Option<String>,
    pub failure: FailureKind,
}

/// The observed fault, augmented with context across retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub description: String,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub prior_failures: Vec<PriorFailure>,
}

impl Issue {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            category: None,
            prior_failures: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Append a failed pass. The diagnosed category, if any, becomes the
    /// issue's working category.
    pub fn record_failure(&mut self, failure: PriorFailure) {
        if let Some(category) = failure.category {
            self.category = Some(category);
        }
        self.prior_failures.push(failure);
    }

    /// Text handed to the diagnostic agent.
    pub fn prompt_text(&self) -> String {
        let mut text = self.description.trim().to_string();
        if let Some(category) = self.category {
            text.push_str(&format!("\n\nSuspected category: {category}"));
        }
        if self.prior_failures.is_empty() {
            return text;
        }

        text.push_str("\n\nPrevious repair attempts failed:");
        for prior in &self.prior_failures {
            let category = prior
                .category
                .map_or_else(|| "unknown".to_string(), |c| c.to_string());
            let solution = prior.solution_id.as_deref().unwrap_or("none");
            text.push_str(&format!(
                "\n- pass {} (category {category}, solution {solution}, {}): {}",
                prior.pass,
                prior.failure.label(),
                truncate_chars(&prior.failure.context_text(), MAX_FAILURE_CONTEXT_CHARS)
            ));
        }
        text
    }
}

/// Truncate on a char boundary, keeping the tail.
///
/// The end of command output is usually where the error is.
pub fn truncate_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - max).collect();
    format!("...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_issue_prompt_is_description() {
        let issue = Issue::new("  disk is full \n");
        assert_eq!(issue.prompt_text(), "disk is full");
    }

    #[test]
    fn test_record_failure_augments_prompt() {
        let mut issue = Issue::new("disk is full");
        issue.record_failure(PriorFailure {
            pass: 1,
            category: Some(Category::Storage),
            solution_id: Some("solution_0".into()),
            failure: FailureKind::ValidationFailure {
                exit_code: Some(1),
                timed_out: false,
                output: "/dev/sda1 99%".into(),
            },
        });

        assert_eq!(issue.category, Some(Category::Storage));
        let text = issue.prompt_text();
        assert!(text.starts_with("disk is full"));
        assert!(text.contains("Suspected category: storage"));
        assert!(text.contains("pass 1 (category storage, solution solution_0, validation_failure)"));
        assert!(text.contains("/dev/sda1 99%"));
    }

    #[test]
    fn test_truncate_keeps_tail() {
        let long = format!("{}END", "x".repeat(5000));
        let cut = truncate_chars(&long, 10);
        assert_eq!(cut, "...xxxxxxxEND");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn test_truncate_multibyte_safe() {
        let text = "é".repeat(20);
        let cut = truncate_chars(&text, 5);
        assert_eq!(cut.chars().filter(|c| *c == 'é').count(), 5);
    }
}
