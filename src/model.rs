//! Core data types for the draft autosave controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a server-side draft document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftDocStatus {
    Active,
    Archived,
    Conflict,
}

/// A server-persisted draft snapshot.
///
/// Wire field names follow the drafts backend: the parent link is
/// `post_id`, the body is `content`, and the owner is `author_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub id: String,
    #[serde(rename = "post_id")]
    pub parent_id: Option<String>,
    #[serde(rename = "author_id")]
    pub owner_id: i64,
    pub title: String,
    #[serde(rename = "content")]
    pub body: String,
    pub metadata: Option<Value>,
    pub status: DraftDocStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conflict_warning: bool,
}

impl Draft {
    /// The opaque last-modified token for this draft.
    ///
    /// Prefers `updated_at`, falls back to `created_at`. Used verbatim in
    /// the `If-Unmodified-Since` header on subsequent updates.
    pub fn modified_token(&self) -> Option<String> {
        self.updated_at
            .or(self.created_at)
            .map(|ts| ts.to_rfc3339())
    }

    /// Extracts the editable payload carried by this draft.
    pub fn to_payload(&self) -> DraftPayload {
        DraftPayload {
            title: self.title.clone(),
            body: self.body.clone(),
            metadata: self.metadata.clone(),
            parent_id: self.parent_id.clone(),
        }
    }
}

/// The editable payload sent on create/update.
///
/// Title, body, and metadata are opaque to the controller except for the
/// substantive-content check used to suppress empty first saves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftPayload {
    #[serde(default)]
    pub title: String,
    #[serde(rename = "content", default)]
    pub body: String,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(rename = "post_id", default)]
    pub parent_id: Option<String>,
}

impl DraftPayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            metadata: None,
            parent_id: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// True when either tracked text field carries non-whitespace content.
    ///
    /// A brand-new draft with no substantive content is never sent to the
    /// server, so idle focus events cannot create empty drafts.
    pub fn has_substantive_content(&self) -> bool {
        !self.title.trim().is_empty() || !self.body.trim().is_empty()
    }
}

/// Observable status of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Idle,
    Loading,
    Saving,
    Saved,
    Error,
    Conflict,
}

/// Classified failure kinds surfaced through [`ControllerState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SaveFailed,
    LoadFailed,
    RateLimited,
    Conflict,
}

/// Which trigger produced a save attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveOrigin {
    Manual,
    Debounce,
    Interval,
}

impl SaveOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveOrigin::Manual => "manual",
            SaveOrigin::Debounce => "debounce",
            SaveOrigin::Interval => "interval",
        }
    }
}

/// Conflict resolution strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// Re-send the local payload after adopting the server's token.
    KeepLocal,
    /// Discard local edits in favor of the server's version.
    ReloadRemote,
}

/// Snapshot of the controller lifecycle visible to callers.
///
/// `conflict_draft` is `None` whenever `status` is not
/// [`DraftStatus::Conflict`]; in `Conflict` it holds the server's copy
/// when known (a bodyless 409 leaves it unset until resolution fetches
/// it).
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    pub status: DraftStatus,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub error: Option<ErrorKind>,
    pub conflict_draft: Option<Draft>,
    pub draft_id: Option<String>,
}

impl ControllerState {
    pub(crate) fn idle() -> Self {
        Self {
            status: DraftStatus::Idle,
            last_saved_at: None,
            error: None,
            conflict_draft: None,
            draft_id: None,
        }
    }
}
