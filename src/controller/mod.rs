//! Draft autosave controller.
//!
//! Owns the draft lifecycle: coalesces edits into debounced saves, runs a
//! fixed-interval heartbeat, detects server-side divergence through the
//! last-modified token, and mirrors every successful save locally so a
//! reload resumes where the session left off.
//!
//! The controller never returns errors from save paths. Callers observe
//! the lifecycle through [`ControllerState`], published on a watch
//! channel, and render status-derived UI from it.

mod conflict;
mod save;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::AutosaveConfig;
use crate::fingerprint::payload_fingerprint;
use crate::metrics::{MetricSink, TracingSink};
use crate::mirror::{storage_key, MirrorStore};
use crate::model::{
    ConflictStrategy, ControllerState, DraftPayload, DraftStatus, ErrorKind, SaveOrigin,
};
use crate::transport::{ApiError, DraftApi, HttpTransport};

/// Per-document options for a controller instance.
#[derive(Debug, Clone)]
pub struct DraftOptions {
    /// Board the draft belongs to; used for keying and metrics.
    pub board_id: String,
    /// Parent post when editing a draft attached to an existing post.
    pub parent_id: Option<String>,
    /// Overrides the derived mirror storage key.
    pub storage_key: Option<String>,
    /// A disabled controller accepts edits but never dispatches saves.
    pub enabled: bool,
}

impl DraftOptions {
    pub fn new(board_id: impl Into<String>) -> Self {
        Self {
            board_id: board_id.into(),
            parent_id: None,
            storage_key: None,
            enabled: true,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Shared controller internals.
///
/// Locks are held only across synchronous sections, never across an
/// await. The `saving` flag is the sole in-flight guard: a save that
/// finds it set is dropped, not queued.
pub(crate) struct Inner {
    pub(crate) config: AutosaveConfig,
    pub(crate) options: DraftOptions,
    pub(crate) api: Arc<dyn DraftApi>,
    pub(crate) mirror: MirrorStore,
    pub(crate) sink: Arc<dyn MetricSink>,
    pub(crate) storage_key: String,
    pub(crate) state_tx: watch::Sender<ControllerState>,
    /// Latest editable payload; only ever sent as a whole.
    pub(crate) pending: Mutex<DraftPayload>,
    /// Opaque last-modified token presented on updates.
    pub(crate) token: Mutex<Option<String>>,
    /// Fingerprint of the last successfully saved payload.
    pub(crate) last_saved_fingerprint: Mutex<String>,
    pub(crate) draft_id: Mutex<Option<String>>,
    /// Saves are gated until startup hydration settles.
    pub(crate) hydration_ready: AtomicBool,
    pub(crate) saving: AtomicBool,
    /// Bumped on every edit; a woken debounce timer that no longer holds
    /// the current generation retires without saving.
    debounce_gen: AtomicU64,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    pub(crate) fn update_state(&self, f: impl FnOnce(&mut ControllerState)) {
        self.state_tx.send_modify(f);
    }

    pub(crate) fn current_state(&self) -> ControllerState {
        self.state_tx.borrow().clone()
    }
}

/// Handle to a running autosave controller.
///
/// Dropping the handle cancels the debounce and heartbeat timers; an
/// in-flight save is left to finish or fail on its own.
pub struct DraftController {
    inner: Arc<Inner>,
}

impl DraftController {
    /// Creates a controller with an explicit transport and metric sink.
    ///
    /// Reads the local mirror for the document key; when a draft id is
    /// found the controller starts in `Loading` and hydrates from the
    /// server before any save is allowed. Must be called within a tokio
    /// runtime: the heartbeat and hydration tasks are spawned here.
    pub fn new(
        config: AutosaveConfig,
        options: DraftOptions,
        api: Arc<dyn DraftApi>,
        sink: Arc<dyn MetricSink>,
    ) -> Self {
        let key = options
            .storage_key
            .clone()
            .unwrap_or_else(|| storage_key(options.parent_id.as_deref(), &options.board_id));
        let mirror = MirrorStore::new(config.data_dir.clone());
        let record = mirror.read(&key);

        let initial = match &record {
            Some(record) => ControllerState {
                status: DraftStatus::Loading,
                last_saved_at: record.last_saved_at,
                error: None,
                conflict_draft: None,
                draft_id: Some(record.draft_id.clone()),
            },
            None => ControllerState::idle(),
        };

        let (state_tx, _) = watch::channel(initial);

        let inner = Arc::new(Inner {
            storage_key: key,
            mirror,
            api,
            sink,
            state_tx,
            pending: Mutex::new(DraftPayload::default()),
            token: Mutex::new(record.as_ref().and_then(|r| r.last_modified.clone())),
            last_saved_fingerprint: Mutex::new(
                record.as_ref().map(|r| r.snapshot.clone()).unwrap_or_default(),
            ),
            draft_id: Mutex::new(record.as_ref().map(|r| r.draft_id.clone())),
            hydration_ready: AtomicBool::new(record.is_none()),
            saving: AtomicBool::new(false),
            debounce_gen: AtomicU64::new(0),
            heartbeat: Mutex::new(None),
            config,
            options,
        });

        if inner.options.enabled {
            let period = inner.config.heartbeat();
            let heartbeat_inner = Arc::clone(&inner);
            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick completes immediately; skip it.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    save::run_save(&heartbeat_inner, SaveOrigin::Interval).await;
                }
            });
            *inner.heartbeat.lock() = Some(handle);
        }

        if record.is_some() {
            let hydrate_inner = Arc::clone(&inner);
            tokio::spawn(async move {
                hydrate(&hydrate_inner).await;
            });
        }

        Self { inner }
    }

    /// Creates a controller with the HTTP transport and tracing metric
    /// sink built from config.
    pub fn from_config(config: AutosaveConfig, options: DraftOptions) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(
            config,
            options,
            Arc::new(transport),
            Arc::new(TracingSink),
        ))
    }

    /// Current lifecycle snapshot.
    pub fn state(&self) -> ControllerState {
        self.inner.current_state()
    }

    /// Subscribes to lifecycle changes.
    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.inner.state_tx.subscribe()
    }

    /// Server-assigned draft id, once the first save succeeded.
    pub fn draft_id(&self) -> Option<String> {
        self.inner.draft_id.lock().clone()
    }

    /// Mirror storage key in use for this document.
    pub fn storage_key(&self) -> &str {
        &self.inner.storage_key
    }

    /// The pending editable payload.
    ///
    /// After a `ReloadRemote` resolution or hydration this is the remote
    /// payload; callers rebind their form state from it.
    pub fn pending_payload(&self) -> DraftPayload {
        self.inner.pending.lock().clone()
    }

    /// Records an edit and (re)arms the debounce timer.
    ///
    /// Each edit replaces the pending payload and supersedes the previous
    /// debounce timer, so only the last edit of a burst is saved. A timer
    /// that already fired is never aborted: the save it dispatched runs to
    /// completion and superseded timers retire via the generation check.
    /// Edits arriving before hydration completes are kept but not
    /// scheduled.
    pub fn edit(&self, payload: DraftPayload) {
        let inner = &self.inner;
        *inner.pending.lock() = payload;

        if !inner.options.enabled || !inner.hydration_ready.load(Ordering::SeqCst) {
            return;
        }

        let generation = inner.debounce_gen.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = inner.config.debounce();
        let debounce_inner = Arc::clone(inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if debounce_inner.debounce_gen.load(Ordering::SeqCst) != generation {
                return;
            }
            save::run_save(&debounce_inner, SaveOrigin::Debounce).await;
        });
    }

    /// Dispatches a manual save of the pending payload.
    ///
    /// Manual saves bypass no-op suppression but still respect the
    /// in-flight guard and the empty-new-draft gate.
    pub async fn trigger_save(&self) {
        save::run_save(&self.inner, SaveOrigin::Manual).await;
    }

    /// Applies a conflict resolution strategy.
    ///
    /// Returns `true` when the conflict is resolved. See
    /// [`ConflictStrategy`] for the two strategies.
    pub async fn resolve_conflict(&self, strategy: ConflictStrategy) -> bool {
        conflict::resolve(&self.inner, strategy).await
    }

    /// Deletes the remote draft (404 tolerated as already deleted),
    /// clears the local mirror, and resets to `Idle`.
    pub async fn clear(&self) {
        let inner = &self.inner;
        let id = inner.draft_id.lock().clone();

        if let Some(id) = id {
            match inner.api.delete(&id).await {
                Ok(()) => {}
                Err(err) if err.http_status() == Some(404) => {}
                Err(err) => {
                    warn!(draft_id = %id, error = %err, "failed to delete remote draft");
                }
            }
        }

        if let Err(err) = inner.mirror.clear(&inner.storage_key) {
            warn!(key = %inner.storage_key, error = %err, "failed to clear mirror record");
        }
        *inner.draft_id.lock() = None;
        *inner.token.lock() = None;
        inner.last_saved_fingerprint.lock().clear();
        inner.hydration_ready.store(true, Ordering::SeqCst);
        inner.state_tx.send_replace(ControllerState::idle());
    }

    /// Cancels the debounce and heartbeat timers.
    ///
    /// The debounce timer is superseded rather than aborted: a timer that
    /// already dispatched a save is left to finish or fail on its own.
    pub fn shutdown(&self) {
        self.inner.debounce_gen.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.inner.heartbeat.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for DraftController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Hydrates an existing draft found in the mirror at startup.
///
/// On success the remote payload becomes the pending payload and the
/// session reproduces the token and fingerprint it held before reload.
/// A 404 means the draft vanished server-side: the mirror is cleared and
/// the id forgotten so the next save re-creates.
async fn hydrate(inner: &Arc<Inner>) {
    let id = match inner.draft_id.lock().clone() {
        Some(id) => id,
        None => {
            inner.hydration_ready.store(true, Ordering::SeqCst);
            return;
        }
    };

    match inner.api.fetch(&id).await {
        Ok(draft) => {
            let payload = draft.to_payload();
            let fingerprint = payload_fingerprint(&payload);
            *inner.pending.lock() = payload;
            *inner.token.lock() = draft.modified_token();
            *inner.last_saved_fingerprint.lock() = fingerprint;
            inner.hydration_ready.store(true, Ordering::SeqCst);

            let last_saved_at = draft.updated_at.or(draft.created_at);
            inner.update_state(|state| {
                state.status = DraftStatus::Saved;
                if last_saved_at.is_some() {
                    state.last_saved_at = last_saved_at;
                }
                state.error = None;
                state.conflict_draft = None;
            });
            debug!(draft_id = %id, "draft hydrated from server");
        }
        Err(err) if err.http_status() == Some(404) => {
            if let Err(err) = inner.mirror.clear(&inner.storage_key) {
                warn!(key = %inner.storage_key, error = %err, "failed to clear mirror record");
            }
            *inner.draft_id.lock() = None;
            *inner.token.lock() = None;
            inner.last_saved_fingerprint.lock().clear();
            inner.hydration_ready.store(true, Ordering::SeqCst);

            inner.update_state(|state| {
                state.status = DraftStatus::Idle;
                state.error = Some(ErrorKind::LoadFailed);
                state.conflict_draft = None;
                state.draft_id = None;
            });
            warn!(draft_id = %id, "draft vanished server-side during hydration");
        }
        Err(err) => {
            inner.hydration_ready.store(true, Ordering::SeqCst);
            inner.update_state(|state| {
                state.status = DraftStatus::Error;
                state.error = Some(ErrorKind::LoadFailed);
                state.conflict_draft = None;
            });
            warn!(draft_id = %id, error = %err, "draft hydration failed");
        }
    }
}
