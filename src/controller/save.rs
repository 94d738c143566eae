//! Save execution and response classification.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::fingerprint::payload_fingerprint;
use crate::metrics::{MetricEvent, EVENT_CONFLICT_DETECTED, EVENT_SAVE_FAILURE};
use crate::mirror::MirrorRecord;
use crate::model::{Draft, DraftStatus, ErrorKind, SaveOrigin};
use crate::transport::ApiError;

use super::Inner;

/// Clears the in-flight flag when the save attempt ends, including when
/// the owning task is cancelled mid-await.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Dispatches one save attempt for the pending payload.
///
/// Returns without side effects when the controller is disabled, when
/// hydration has not settled, or when another save is in flight. A racing
/// save is dropped, not queued; the next scheduled trigger picks up the
/// pending edits.
pub(super) async fn run_save(inner: &Arc<Inner>, origin: SaveOrigin) {
    if !inner.options.enabled {
        return;
    }
    if !inner.hydration_ready.load(Ordering::SeqCst) {
        return;
    }
    if inner.saving.swap(true, Ordering::SeqCst) {
        debug!(origin = origin.as_str(), "save dropped, another in flight");
        return;
    }
    let _in_flight = InFlight(&inner.saving);

    execute_save(inner, origin).await;
}

async fn execute_save(inner: &Arc<Inner>, origin: SaveOrigin) {
    let payload = inner.pending.lock().clone();
    let fingerprint = payload_fingerprint(&payload);
    let draft_id = inner.draft_id.lock().clone();

    // Never create an empty draft from idle focus events.
    if draft_id.is_none() && !payload.has_substantive_content() {
        return;
    }

    // No-op suppression: scheduled saves of an unchanged payload are
    // skipped; manual saves always go out.
    if origin != SaveOrigin::Manual && fingerprint == *inner.last_saved_fingerprint.lock() {
        debug!(origin = origin.as_str(), "save suppressed, payload unchanged");
        return;
    }

    inner.update_state(|state| {
        state.status = DraftStatus::Saving;
        state.error = None;
        state.conflict_draft = None;
    });

    let result = match &draft_id {
        None => inner.api.create(&payload).await,
        Some(id) => {
            let token = inner.token.lock().clone();
            inner.api.update(id, &payload, token.as_deref()).await
        }
    };

    match result {
        Ok(draft) => handle_success(inner, origin, draft, fingerprint),
        Err(err) => handle_failure(inner, origin, err),
    }
}

/// Adopts the server's response as the new baseline.
///
/// The mirror record carries the fingerprint of the payload that was
/// actually sent, not whatever is pending by the time the response lands.
fn handle_success(inner: &Arc<Inner>, origin: SaveOrigin, draft: Draft, fingerprint: String) {
    let token = draft.modified_token();
    let last_saved_at = draft.updated_at.or(draft.created_at);

    *inner.draft_id.lock() = Some(draft.id.clone());
    *inner.token.lock() = token.clone();
    *inner.last_saved_fingerprint.lock() = fingerprint.clone();

    let record = MirrorRecord {
        draft_id: draft.id.clone(),
        last_modified: token,
        snapshot: fingerprint,
        last_saved_at,
    };
    if let Err(err) = inner.mirror.write(&inner.storage_key, &record) {
        warn!(key = %inner.storage_key, error = %err, "failed to persist mirror record");
    }

    if draft.conflict_warning {
        // Server accepted the write but flagged the client's view as
        // stale; surface it the same way as a hard 409.
        let draft_id = draft.id.clone();
        inner.update_state(|state| {
            state.status = DraftStatus::Conflict;
            if last_saved_at.is_some() {
                state.last_saved_at = last_saved_at;
            }
            state.error = Some(ErrorKind::Conflict);
            state.conflict_draft = Some(draft);
            state.draft_id = Some(draft_id);
        });
        emit_failure(inner, origin, DraftStatus::Conflict, ErrorKind::Conflict, "conflict_warning", None);
        emit_conflict_detected(inner, origin, "conflict_warning");
    } else {
        let draft_id = draft.id;
        inner.update_state(|state| {
            state.status = DraftStatus::Saved;
            if last_saved_at.is_some() {
                state.last_saved_at = last_saved_at;
            }
            state.error = None;
            state.conflict_draft = None;
            state.draft_id = Some(draft_id);
        });
    }
}

fn handle_failure(inner: &Arc<Inner>, origin: SaveOrigin, err: ApiError) {
    match err.http_status() {
        Some(409) => {
            let conflict = err.conflict_draft();
            inner.update_state(|state| {
                state.status = DraftStatus::Conflict;
                state.error = Some(ErrorKind::Conflict);
                state.conflict_draft = conflict.clone();
            });
            emit_failure(inner, origin, DraftStatus::Conflict, ErrorKind::Conflict, "http_conflict", Some(409));
            emit_conflict_detected(inner, origin, "http_conflict");
        }
        Some(429) => {
            inner.update_state(|state| {
                state.status = DraftStatus::Error;
                state.error = Some(ErrorKind::RateLimited);
                state.conflict_draft = None;
            });
            emit_failure(inner, origin, DraftStatus::Error, ErrorKind::RateLimited, "rate_limited", Some(429));
        }
        Some(404) => {
            // Draft deleted server-side mid-session: forget everything so
            // the next save re-creates.
            if let Err(err) = inner.mirror.clear(&inner.storage_key) {
                warn!(key = %inner.storage_key, error = %err, "failed to clear mirror record");
            }
            *inner.draft_id.lock() = None;
            *inner.token.lock() = None;
            inner.last_saved_fingerprint.lock().clear();

            inner.update_state(|state| {
                state.status = DraftStatus::Idle;
                state.error = Some(ErrorKind::LoadFailed);
                state.conflict_draft = None;
                state.draft_id = None;
            });
            emit_failure(inner, origin, DraftStatus::Error, ErrorKind::LoadFailed, "load_failed", Some(404));
            warn!(origin = origin.as_str(), "draft vanished server-side during save");
        }
        status => {
            inner.update_state(|state| {
                state.status = DraftStatus::Error;
                state.error = Some(ErrorKind::SaveFailed);
                state.conflict_draft = None;
            });
            emit_failure(inner, origin, DraftStatus::Error, ErrorKind::SaveFailed, "save_failed", status);
            warn!(origin = origin.as_str(), error = %err, "draft save failed");
        }
    }
}

fn emit_failure(
    inner: &Arc<Inner>,
    origin: SaveOrigin,
    status: DraftStatus,
    error: ErrorKind,
    reason: &'static str,
    http_status: Option<u16>,
) {
    inner.sink.emit(&MetricEvent {
        name: EVENT_SAVE_FAILURE,
        status,
        error: Some(error),
        reason,
        origin,
        board_id: inner.options.board_id.clone(),
        draft_id: inner.draft_id.lock().clone(),
        timestamp: Utc::now(),
        http_status,
    });
}

fn emit_conflict_detected(inner: &Arc<Inner>, origin: SaveOrigin, reason: &'static str) {
    inner.sink.emit(&MetricEvent {
        name: EVENT_CONFLICT_DETECTED,
        status: DraftStatus::Conflict,
        error: Some(ErrorKind::Conflict),
        reason,
        origin,
        board_id: inner.options.board_id.clone(),
        draft_id: inner.draft_id.lock().clone(),
        timestamp: Utc::now(),
        http_status: None,
    });
}

pub(super) fn emit_conflict_resolved(inner: &Arc<Inner>, reason: &'static str) {
    inner.sink.emit(&MetricEvent {
        name: crate::metrics::EVENT_CONFLICT_RESOLVED,
        status: inner.current_state().status,
        error: None,
        reason,
        origin: SaveOrigin::Manual,
        board_id: inner.options.board_id.clone(),
        draft_id: inner.draft_id.lock().clone(),
        timestamp: Utc::now(),
        http_status: None,
    });
}
