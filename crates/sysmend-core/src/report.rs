//! Session report artifacts: `<dir>/<session_id>/session.json` plus a
//! `session.digest` with the SHA-256 of the JSON bytes.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::info;

use crate::domain::{RepairError, Result, SessionReport};

const REPORT_FILE: &str = "session.json";
const DIGEST_FILE: &str = "session.digest";

fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Persist `report` and return the artifact path.
pub fn write_session_report(report: &SessionReport, dir: &Path) -> Result<PathBuf> {
    let session_dir = dir.join(report.session_id.to_string());
    std::fs::create_dir_all(&session_dir)?;

    let artifact_path = session_dir.join(REPORT_FILE);
    let json = serde_json::to_vec_pretty(report)?;
    let digest = digest_hex(&json);

    std::fs::write(&artifact_path, &json)?;
    std::fs::write(session_dir.join(DIGEST_FILE), digest.as_bytes())?;

    info!(
        session_id = %report.session_id,
        path = %artifact_path.display(),
        "session report written"
    );
    Ok(artifact_path)
}

/// Read and verify `<dir>/<session_id>/session.json`.
pub fn read_session_report(session_id: &str, dir: &Path) -> Result<SessionReport> {
    let session_dir = dir.join(session_id);
    let json = std::fs::read(session_dir.join(REPORT_FILE))?;
    let expected = std::fs::read_to_string(session_dir.join(DIGEST_FILE))?;
    let actual = digest_hex(&json);
    if expected.trim() != actual {
        return Err(RepairError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }

    Ok(serde_json::from_slice(&json)?)
}
