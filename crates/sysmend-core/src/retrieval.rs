//! Diagnosis-to-solution selection.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use solution_index::{Category, ScoredSolution, Solution, SolutionIndex, SolutionQuery};
use tracing::{debug, info};

use crate::domain::{DiagnosisResult, DiagnosisStatus, RepairError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Minimum cosine similarity for the best candidate.
    pub similarity_threshold: f32,
    /// Candidates within this distance of the best score count as tied.
    pub tie_epsilon: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.35,
            tie_epsilon: 0.01,
        }
    }
}

/// The solution chosen for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedSolution {
    pub solution: Solution,
    pub score: f32,
    /// Critical risk, or the diagnosis itself was critical_risk.
    pub requires_confirmation: bool,
    /// Remaining ranked candidates, best first.
    pub alternatives: Vec<ScoredSolution>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RetrievalOutcome {
    Selected(SelectedSolution),
    Miss { best_score: Option<f32> },
}

pub struct SolutionRetriever {
    index: Arc<SolutionIndex>,
    config: RetrievalConfig,
}

impl SolutionRetriever {
    pub fn new(index: Arc<SolutionIndex>, config: RetrievalConfig) -> Self {
        Self { index, config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub async fn retrieve(&self, diagnosis: &DiagnosisResult) -> Result<RetrievalOutcome> {
        if diagnosis.status == DiagnosisStatus::NeedsInvestigation {
            return Err(RepairError::RetrievalRejected(
                "needs_investigation diagnoses cannot be used for retrieval".to_string(),
            ));
        }

        let mut query = SolutionQuery::new(diagnosis.query_text()).with_top_k(self.config.top_k);
        if diagnosis.category != Category::Unknown {
            query = query.with_category(diagnosis.category);
        }

        let hits = self.index.query(&query).await?;
        let best_score = hits.first().map(|h| h.score);
        debug!(candidates = hits.len(), best_score = ?best_score, "retrieval candidates");

        match best_score {
            Some(best) if best >= self.config.similarity_threshold => {}
            _ => {
                info!(
                    category = %diagnosis.category,
                    best_score = ?best_score,
                    threshold = self.config.similarity_threshold,
                    "retrieval miss"
                );
                return Ok(RetrievalOutcome::Miss { best_score });
            }
        }

        let chosen = select_among_ties(
            &hits,
            self.config.tie_epsilon,
            self.config.similarity_threshold,
        );
        let mut alternatives = hits;
        let ScoredSolution { solution, score } = alternatives.remove(chosen);

        let requires_confirmation = solution.risk_level().requires_confirmation()
            || diagnosis.status == DiagnosisStatus::CriticalRisk;

        info!(
            solution_id = %solution.id,
            score,
            risk = %solution.risk_level(),
            requires_confirmation,
            "solution selected"
        );

        Ok(RetrievalOutcome::Selected(SelectedSolution {
            solution,
            score,
            requires_confirmation,
            alternatives,
        }))
    }
}

/// Index of the lowest-risk candidate among those within `epsilon` of the
/// best score and at or above `threshold`. Earlier rank wins among equal
/// risk. `hits` is sorted best first.
fn select_among_ties(hits: &[ScoredSolution], epsilon: f32, threshold: f32) -> usize {
    let Some(best) = hits.first().map(|h| h.score) else {
        return 0;
    };
    hits.iter()
        .enumerate()
        .take_while(|(_, h)| best - h.score <= epsilon && h.score >= threshold)
        .min_by_key(|(i, h)| (h.solution.risk_level(), *i))
        .map_or(0, |(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use solution_index::{HashEmbedder, RiskLevel, SolutionRecord, DEFAULT_COLLECTION};

    fn record(category: Category, trigger: &str, risk: RiskLevel) -> SolutionRecord {
        SolutionRecord {
            category,
            error_trigger: trigger.into(),
            context: String::new(),
            solution_explanation: String::new(),
            risk_level: risk,
            steps: vec!["true".into()],
            backup_required: false,
            requires_reboot: false,
            validation_command: "true".into(),
            alternative_solution: None,
        }
    }

    async fn retriever(corpus: &[SolutionRecord], config: RetrievalConfig) -> SolutionRetriever {
        let index = SolutionIndex::in_memory(Arc::new(HashEmbedder::default()), DEFAULT_COLLECTION);
        index.rebuild(corpus).await.unwrap();
        SolutionRetriever::new(Arc::new(index), config)
    }

    fn scored(id: usize, score: f32, risk: RiskLevel) -> ScoredSolution {
        ScoredSolution {
            solution: Solution::new(id, record(Category::Storage, "x", risk)),
            score,
        }
    }

    #[test]
    fn test_tie_break_prefers_lower_risk() {
        let hits = vec![
            scored(0, 0.90, RiskLevel::High),
            scored(1, 0.895, RiskLevel::Low),
            scored(2, 0.70, RiskLevel::Low),
        ];
        assert_eq!(select_among_ties(&hits, 0.01, 0.35), 1);
        assert_eq!(select_among_ties(&hits, 0.0, 0.35), 0);
    }

    #[test]
    fn test_tie_break_keeps_rank_for_equal_risk() {
        let hits = vec![scored(0, 0.9, RiskLevel::Low), scored(1, 0.9, RiskLevel::Low)];
        assert_eq!(select_among_ties(&hits, 0.01, 0.35), 0);
    }

    #[test]
    fn test_tie_below_threshold_is_ignored() {
        let hits = vec![
            scored(0, 0.355, RiskLevel::High),
            scored(1, 0.348, RiskLevel::Low),
        ];
        assert_eq!(select_among_ties(&hits, 0.01, 0.35), 0);
        assert_eq!(select_among_ties(&hits, 0.01, 0.30), 1);
    }

    #[tokio::test]
    async fn test_selects_matching_category() {
        let r = retriever(
            &[
                record(Category::Storage, "disk full no space left", RiskLevel::Low),
                record(Category::Network, "dns resolution failure", RiskLevel::Low),
            ],
            RetrievalConfig::default(),
        )
        .await;
        let d = DiagnosisResult::definitive(Category::Storage, "disk full", "no space left on /");
        match r.retrieve(&d).await.unwrap() {
            RetrievalOutcome::Selected(sel) => {
                assert_eq!(sel.solution.id, "solution_0");
                assert!(!sel.requires_confirmation);
                assert!(sel.alternatives.is_empty());
            }
            other => panic!("expected selection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_category_without_records_is_miss() {
        let r = retriever(
            &[record(Category::Storage, "disk full", RiskLevel::Low)],
            RetrievalConfig::default(),
        )
        .await;
        let d = DiagnosisResult::definitive(Category::Network, "dns down", "resolver stopped");
        assert_eq!(
            r.retrieve(&d).await.unwrap(),
            RetrievalOutcome::Miss { best_score: None }
        );
    }

    #[tokio::test]
    async fn test_below_threshold_is_miss() {
        let r = retriever(
            &[record(Category::Storage, "disk full", RiskLevel::Low)],
            RetrievalConfig {
                similarity_threshold: 0.99,
                ..RetrievalConfig::default()
            },
        )
        .await;
        let d = DiagnosisResult::definitive(Category::Storage, "inode exhaustion", "too many files");
        assert!(matches!(
            r.retrieve(&d).await.unwrap(),
            RetrievalOutcome::Miss { best_score: Some(_) }
        ));
    }

    #[tokio::test]
    async fn test_critical_risk_diagnosis_requires_confirmation() {
        let r = retriever(
            &[record(Category::Storage, "disk full", RiskLevel::Low)],
            RetrievalConfig::default(),
        )
        .await;
        let d = DiagnosisResult::critical(Category::Storage, "disk full on a degraded raid");
        match r.retrieve(&d).await.unwrap() {
            RetrievalOutcome::Selected(sel) => assert!(sel.requires_confirmation),
            other => panic!("expected selection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_needs_investigation_rejected() {
        let r = retriever(&[], RetrievalConfig::default()).await;
        let d = DiagnosisResult::inconclusive(Category::Unknown, "no evidence");
        assert!(matches!(
            r.retrieve(&d).await,
            Err(RepairError::RetrievalRejected(_))
        ));
    }
}
