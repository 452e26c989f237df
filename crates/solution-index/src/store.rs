//! On-disk collection persistence.
//!
//! Layout: `<root>/<collection>/collection.json` and
//! `<root>/<collection>/collection.digest` (SHA-256 hex of the JSON bytes).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::IndexError;
use crate::record::EntryMetadata;
use crate::Result;

const COLLECTION_FILE: &str = "collection.json";
const DIGEST_FILE: &str = "collection.digest";

/// One persisted index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub id: String,
    pub seq: usize,
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: EntryMetadata,
}

/// A whole persisted collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedCollection {
    pub name: String,
    pub description: String,
    pub embedder: String,
    pub dimension: usize,
    pub built_at: DateTime<Utc>,
    pub entries: Vec<PersistedEntry>,
}

/// SHA-256 hex digest of a byte slice.
pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn collection_dir(root: &Path, name: &str) -> PathBuf {
    root.join(name)
}

/// Persist a collection and return its digest.
pub fn write_collection(root: &Path, collection: &PersistedCollection) -> Result<String> {
    let dir = collection_dir(root, &collection.name);
    std::fs::create_dir_all(&dir)?;

    let json = serde_json::to_vec_pretty(collection)?;
    let digest = digest_hex(&json);

    std::fs::write(dir.join(COLLECTION_FILE), &json)?;
    std::fs::write(dir.join(DIGEST_FILE), digest.as_bytes())?;

    debug!(
        collection = %collection.name,
        entries = collection.entries.len(),
        digest = %digest,
        "collection persisted"
    );
    Ok(digest)
}

/// Read and verify a collection. Returns `Ok(None)` when it does not exist.
pub fn read_collection(root: &Path, name: &str) -> Result<Option<PersistedCollection>> {
    let dir = collection_dir(root, name);
    let json_path = dir.join(COLLECTION_FILE);
    if !json_path.exists() {
        return Ok(None);
    }

    let json = std::fs::read(&json_path)?;
    let expected = std::fs::read_to_string(dir.join(DIGEST_FILE))?;
    let actual = digest_hex(&json);
    if expected.trim() != actual {
        return Err(IndexError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }

    Ok(Some(serde_json::from_slice(&json)?))
}

/// Remove a collection directory. No-op if absent.
pub fn delete_collection(root: &Path, name: &str) -> Result<bool> {
    let dir = collection_dir(root, name);
    if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
        debug!(collection = %name, "deleted old collection");
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Category, RiskLevel};

    fn sample(name: &str) -> PersistedCollection {
        PersistedCollection {
            name: name.to_string(),
            description: "test".into(),
            embedder: "hash-bow-8".into(),
            dimension: 8,
            built_at: Utc::now(),
            entries: vec![PersistedEntry {
                id: "solution_0".into(),
                seq: 0,
                document: "disk full\nctx\nexpl".into(),
                embedding: vec![0.5; 8],
                metadata: EntryMetadata {
                    category: Category::Storage,
                    error_trigger: "disk full".into(),
                    context: "ctx".into(),
                    solution_explanation: "expl".into(),
                    risk_level: RiskLevel::Low,
                    steps: "[\"apt-get clean\"]".into(),
                    backup_required: false,
                    requires_reboot: false,
                    validation_command: "true".into(),
                    alternative_solution: None,
                },
            }],
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let digest = write_collection(dir.path(), &sample("c")).unwrap();
        assert_eq!(digest.len(), 64);
        let back = read_collection(dir.path(), "c").unwrap().unwrap();
        assert_eq!(back.entries.len(), 1);
        assert_eq!(back.entries[0].id, "solution_0");
    }

    #[test]
    fn test_missing_collection_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_collection(dir.path(), "absent").unwrap().is_none());
        assert!(!delete_collection(dir.path(), "absent").unwrap());
    }

    #[test]
    fn test_tampered_collection_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_collection(dir.path(), &sample("c")).unwrap();
        let path = dir.path().join("c").join(COLLECTION_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(b"\n");
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            read_collection(dir.path(), "c").unwrap_err(),
            IndexError::DigestMismatch { .. }
        ));
    }
}
