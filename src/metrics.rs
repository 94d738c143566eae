//! Fire-and-forget metric events for failures and conflicts.
//!
//! Every failed save, detected conflict, and conflict resolution produces
//! one structured event for an external observability collector. Emission
//! must never block the save path and must never fail it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{DraftStatus, ErrorKind, SaveOrigin};

/// Event emitted on every failed save attempt.
pub const EVENT_SAVE_FAILURE: &str = "drafts.save.failure";
/// Event emitted when a divergence from the server copy is detected.
pub const EVENT_CONFLICT_DETECTED: &str = "drafts.conflict.detected";
/// Event emitted when a conflict resolution completes.
pub const EVENT_CONFLICT_RESOLVED: &str = "drafts.conflict.resolved";

/// Structured metric event.
#[derive(Debug, Clone, Serialize)]
pub struct MetricEvent {
    pub name: &'static str,
    pub status: DraftStatus,
    pub error: Option<ErrorKind>,
    /// Short machine-readable cause, e.g. `http_conflict` or `keep_local`.
    pub reason: &'static str,
    pub origin: SaveOrigin,
    pub board_id: String,
    pub draft_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

/// Destination for metric events.
///
/// Implementations must be non-blocking and infallible from the caller's
/// point of view; a sink that can fail has to swallow its own errors.
pub trait MetricSink: Send + Sync {
    fn emit(&self, event: &MetricEvent);
}

/// Default sink: structured `tracing` events under the
/// `draftkeeper::metrics` target.
#[derive(Debug, Default)]
pub struct TracingSink;

impl MetricSink for TracingSink {
    fn emit(&self, event: &MetricEvent) {
        tracing::info!(
            target: "draftkeeper::metrics",
            name = event.name,
            status = ?event.status,
            error = ?event.error,
            reason = event.reason,
            origin = event.origin.as_str(),
            board_id = %event.board_id,
            draft_id = event.draft_id.as_deref().unwrap_or(""),
            http_status = event.http_status.unwrap_or(0),
            timestamp = %event.timestamp.to_rfc3339(),
            "draft metric"
        );
    }
}

/// Sink that discards every event.
#[derive(Debug, Default)]
pub struct NullSink;

impl MetricSink for NullSink {
    fn emit(&self, _event: &MetricEvent) {}
}
