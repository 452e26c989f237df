//! End-to-end tests for rebuild, persistence and deterministic querying.

use std::sync::Arc;

use solution_index::{
    parse_corpus, Category, HashEmbedder, IndexError, SolutionIndex, SolutionQuery,
    DEFAULT_COLLECTION,
};

const CORPUS: &str = r#"[
  {
    "category": "storage",
    "error_trigger": "No space left on device",
    "context": "root filesystem full, apt cache large",
    "solution_explanation": "Clean the apt package cache to free disk space",
    "risk_level": "low",
    "steps": ["apt-get clean"],
    "backup_required": false,
    "requires_reboot": false,
    "validation_command": "df -h / | check-threshold",
    "alternative_solution": "Remove old kernels with apt autoremove"
  },
  {
    "category": "package_manager",
    "error_trigger": "Could not get lock /var/lib/dpkg/lock-frontend",
    "context": "another apt process holds the dpkg lock",
    "solution_explanation": "Wait for or stop the other apt process and reconfigure dpkg",
    "risk_level": "medium",
    "steps": ["dpkg --configure -a"],
    "backup_required": true,
    "requires_reboot": false,
    "validation_command": "apt-get check",
    "alternative_solution": null
  },
  {
    "category": "network",
    "error_trigger": "Temporary failure in name resolution",
    "context": "systemd-resolved stopped, DNS lookups fail",
    "solution_explanation": "Restart systemd-resolved to restore DNS resolution",
    "risk_level": "low",
    "steps": ["systemctl restart systemd-resolved"],
    "backup_required": false,
    "requires_reboot": false,
    "validation_command": "getent hosts ubuntu.com",
    "alternative_solution": null
  }
]"#;

fn embedder() -> Arc<HashEmbedder> {
    Arc::new(HashEmbedder::default())
}

#[tokio::test]
async fn rebuild_persists_and_reopen_restores_entries() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = parse_corpus(CORPUS).unwrap();

    let index = SolutionIndex::open(embedder(), DEFAULT_COLLECTION, dir.path()).unwrap();
    assert!(index.is_empty().await);
    let summary = index.rebuild(&corpus).await.unwrap();
    assert_eq!(summary.total, 3);
    assert!(summary.digest.is_some());

    let reopened = SolutionIndex::open(embedder(), DEFAULT_COLLECTION, dir.path()).unwrap();
    assert_eq!(reopened.len().await, 3);
    let dpkg = reopened.get("solution_1").await.unwrap();
    assert_eq!(dpkg.record.steps, vec!["dpkg --configure -a".to_string()]);
    assert!(dpkg.record.backup_required);
}

#[tokio::test]
async fn repeated_queries_return_identical_top_result() {
    let corpus = parse_corpus(CORPUS).unwrap();
    let index = SolutionIndex::in_memory(embedder(), DEFAULT_COLLECTION);
    index.rebuild(&corpus).await.unwrap();

    let query = SolutionQuery::new("dns name resolution is failing").with_top_k(3);
    let first = index.query(&query).await.unwrap();
    for _ in 0..10 {
        let again = index.query(&query).await.unwrap();
        assert_eq!(again[0].solution.id, first[0].solution.id);
        assert_eq!(again[0].score, first[0].score);
    }
    assert_eq!(first[0].solution.category(), Category::Network);
}

#[tokio::test]
async fn scores_are_descending() {
    let corpus = parse_corpus(CORPUS).unwrap();
    let index = SolutionIndex::in_memory(embedder(), DEFAULT_COLLECTION);
    index.rebuild(&corpus).await.unwrap();

    let hits = index
        .query(&SolutionQuery::new("no space left on disk").with_top_k(3))
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(hits[0].solution.id, "solution_0");
}

#[tokio::test]
async fn concurrent_queries_see_a_complete_index() {
    let corpus = parse_corpus(CORPUS).unwrap();
    let index = Arc::new(SolutionIndex::in_memory(embedder(), DEFAULT_COLLECTION));
    index.rebuild(&corpus).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let index = index.clone();
        let corpus = corpus.clone();
        handles.push(tokio::spawn(async move {
            if i % 4 == 0 {
                index.rebuild(&corpus).await.unwrap();
                None
            } else {
                let hits = index
                    .query(&SolutionQuery::new("dpkg lock held").with_top_k(10))
                    .await
                    .unwrap();
                Some(hits.len())
            }
        }));
    }

    for handle in handles {
        if let Some(n) = handle.await.unwrap() {
            // A reader never observes the cleared, partially rebuilt state.
            assert_eq!(n, 3);
        }
    }
}

#[tokio::test]
async fn reopening_with_another_embedder_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = parse_corpus(CORPUS).unwrap();
    SolutionIndex::open(embedder(), DEFAULT_COLLECTION, dir.path())
        .unwrap()
        .rebuild(&corpus)
        .await
        .unwrap();

    let err = SolutionIndex::open(Arc::new(HashEmbedder::new(64)), DEFAULT_COLLECTION, dir.path())
        .unwrap_err();
    assert!(matches!(err, IndexError::EmbedderMismatch { .. }));
}
