//! Structured lifecycle events for repair sessions.
//!
//! - `session_span`: span tagging everything inside a session with its id;
//!   attach it to the session future with `tracing::Instrument`
//! - `emit_*`: one `info!`/`warn!` event per lifecycle step, keyed by `event`

use tracing::{info, warn, Span};
use uuid::Uuid;

use crate::domain::{FailureKind, RepairState};

pub fn session_span(session_id: &Uuid) -> Span {
    tracing::info_span!("sysmend.session", session_id = %session_id)
}

pub fn emit_session_started(session_id: &Uuid, max_retries: u32) {
    info!(event = "session.started", session_id = %session_id, max_retries);
}

pub fn emit_state_transition(session_id: &Uuid, from: RepairState, to: RepairState, retry_count: u32) {
    info!(
        event = "session.transition",
        session_id = %session_id,
        from = %from,
        to = %to,
        retry_count,
    );
}

/// A pass failed and consumed (or tried to consume) a retry.
pub fn emit_attempt_failed(session_id: &Uuid, pass: u32, failure: &FailureKind, retry_count: u32) {
    warn!(
        event = "session.attempt_failed",
        session_id = %session_id,
        pass,
        failure = failure.label(),
        retry_count,
    );
}

pub fn emit_session_finished(session_id: &Uuid, outcome: &str, passes: usize, duration_ms: u64) {
    info!(
        event = "session.finished",
        session_id = %session_id,
        outcome,
        passes,
        duration_ms,
    );
}
