//! Draftkeeper
//!
//! Client-side autosave controller for long-lived editable drafts.
//!
//! Rapid edits are coalesced into debounced network writes, a heartbeat
//! bounds staleness under continuous typing, an `If-Unmodified-Since`
//! token detects concurrent edits from another session, and a file-backed
//! local mirror lets a reloaded session resume the same draft. Detected
//! conflicts are resolved explicitly, keeping either the local or the
//! remote version.
//!
//! ```no_run
//! use draftkeeper::{AutosaveConfig, DraftController, DraftOptions, DraftPayload};
//!
//! # async fn run() -> Result<(), draftkeeper::ApiError> {
//! let config = AutosaveConfig::load(None).expect("config");
//! let controller = DraftController::from_config(config, DraftOptions::new("board-7"))?;
//!
//! controller.edit(DraftPayload::new("Title", "Body so far"));
//! // ... later, a manual save before navigating away:
//! controller.trigger_save().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod fingerprint;
pub mod metrics;
pub mod mirror;
pub mod model;
pub mod transport;

pub use config::{AutosaveConfig, ConfigError};
pub use controller::{DraftController, DraftOptions};
pub use fingerprint::payload_fingerprint;
pub use metrics::{MetricEvent, MetricSink, NullSink, TracingSink};
pub use mirror::{storage_key, MirrorRecord, MirrorStore};
pub use model::{
    ConflictStrategy, ControllerState, Draft, DraftDocStatus, DraftPayload, DraftStatus,
    ErrorKind, SaveOrigin,
};
pub use transport::{ApiError, DraftApi, HttpTransport};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
