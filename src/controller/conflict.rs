//! Conflict resolution strategies.
//!
//! A conflict means the server's copy advanced beyond the client's
//! last-known baseline. The caller chooses: keep the local edits and
//! overwrite the server, or discard them in favor of the server's version.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::fingerprint::payload_fingerprint;
use crate::mirror::MirrorRecord;
use crate::model::{ConflictStrategy, Draft, DraftStatus, SaveOrigin};

use super::save::{emit_conflict_resolved, run_save};
use super::Inner;

/// Applies a resolution strategy. Returns `true` when resolved.
pub(super) async fn resolve(inner: &Arc<Inner>, strategy: ConflictStrategy) -> bool {
    match strategy {
        ConflictStrategy::KeepLocal => keep_local(inner).await,
        ConflictStrategy::ReloadRemote => reload_remote(inner).await,
    }
}

/// Re-sends the local payload, first adopting the server's token as the
/// new baseline so the update is accepted. Resolution succeeded only if
/// the resulting status is no longer `Conflict`.
async fn keep_local(inner: &Arc<Inner>) -> bool {
    let conflict = inner.current_state().conflict_draft;
    if let Some(conflict) = &conflict {
        if let Some(token) = conflict.modified_token() {
            *inner.token.lock() = Some(token);
        }
    }

    run_save(inner, SaveOrigin::Manual).await;

    let resolved = inner.current_state().status != DraftStatus::Conflict;
    if resolved {
        emit_conflict_resolved(inner, "keep_local");
        debug!("conflict resolved keeping local payload");
    }
    resolved
}

/// Discards local edits in favor of the server's version.
///
/// Uses the held conflicting draft, or fetches it fresh when unknown. If
/// the fetch itself fails the controller stays in `Conflict` rather than
/// marking the divergence resolved over stale local edits.
async fn reload_remote(inner: &Arc<Inner>) -> bool {
    let mut draft = inner.current_state().conflict_draft;

    if draft.is_none() {
        let id = inner.draft_id.lock().clone();
        if let Some(id) = id {
            match inner.api.fetch(&id).await {
                Ok(remote) => draft = Some(remote),
                Err(err) => {
                    warn!(draft_id = %id, error = %err, "remote fetch failed during conflict resolution");
                    return false;
                }
            }
        }
    }

    let draft = match draft {
        Some(draft) => draft,
        None => {
            // Nothing to reload: no conflicting draft held and no id to
            // fetch. Clear the conflict flag without touching the payload.
            inner.update_state(|state| {
                state.status = DraftStatus::Saved;
                state.error = None;
                state.conflict_draft = None;
            });
            emit_conflict_resolved(inner, "reload_remote");
            return true;
        }
    };

    adopt_remote(inner, draft);
    emit_conflict_resolved(inner, "reload_remote");
    true
}

/// Maps the remote draft onto the editable payload and re-baselines the
/// fingerprint, token, and mirror record from it.
fn adopt_remote(inner: &Arc<Inner>, draft: Draft) {
    let payload = draft.to_payload();
    let fingerprint = payload_fingerprint(&payload);
    let token = draft.modified_token();
    let last_saved_at = draft.updated_at.or(draft.created_at);

    *inner.pending.lock() = payload;
    *inner.token.lock() = token.clone();
    *inner.last_saved_fingerprint.lock() = fingerprint.clone();
    *inner.draft_id.lock() = Some(draft.id.clone());

    let record = MirrorRecord {
        draft_id: draft.id.clone(),
        last_modified: token,
        snapshot: fingerprint,
        last_saved_at,
    };
    if let Err(err) = inner.mirror.write(&inner.storage_key, &record) {
        warn!(key = %inner.storage_key, error = %err, "failed to persist mirror record");
    }

    inner.update_state(|state| {
        state.status = DraftStatus::Saved;
        if last_saved_at.is_some() {
            state.last_saved_at = last_saved_at;
        }
        state.error = None;
        state.conflict_draft = None;
        state.draft_id = Some(draft.id.clone());
    });
    debug!(draft_id = %draft.id, "conflict resolved reloading remote payload");
}
