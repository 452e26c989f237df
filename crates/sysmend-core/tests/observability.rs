//! Structured lifecycle events for repair sessions.

use sysmend_core::domain::{FailureKind, RepairState};
use sysmend_core::obs::{
    emit_attempt_failed, emit_session_finished, emit_session_started, emit_state_transition,
    session_span,
};
use tracing::Instrument;
use tracing_test::traced_test;
use uuid::Uuid;

#[traced_test]
#[test]
fn test_emit_session_started() {
    emit_session_started(&Uuid::new_v4(), 3);
}

#[traced_test]
#[test]
fn test_emit_state_transition() {
    emit_state_transition(
        &Uuid::new_v4(),
        RepairState::Diagnosing,
        RepairState::Retrieving,
        0,
    );
}

#[traced_test]
#[test]
fn test_emit_attempt_failed_is_warning() {
    let failure = FailureKind::ValidationFailure {
        exit_code: Some(1),
        timed_out: false,
        output: "apache2 inactive".into(),
    };
    emit_attempt_failed(&Uuid::new_v4(), 2, &failure, 2);
}

#[traced_test]
#[test]
fn test_emit_session_finished() {
    emit_session_finished(&Uuid::new_v4(), "escalated", 4, 1250);
}

#[traced_test]
#[tokio::test]
async fn test_session_span_wraps_future() {
    let id = Uuid::new_v4();
    async {
        emit_session_started(&id, 1);
        tokio::task::yield_now().await;
        emit_session_finished(&id, "succeeded", 1, 10);
    }
    .instrument(session_span(&id))
    .await;
}
