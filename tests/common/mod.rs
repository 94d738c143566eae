//! Shared test doubles: an in-memory draft server and a recording
//! metric sink.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use draftkeeper::{
    ApiError, AutosaveConfig, Draft, DraftApi, DraftDocStatus, DraftPayload, MetricEvent,
    MetricSink,
};

/// One recorded API call.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Create,
    Update { id: String, token: Option<String> },
    Fetch { id: String },
    Delete { id: String },
}

/// One-shot injected failure for the next request.
#[derive(Debug)]
pub enum Inject {
    Status(u16, Option<serde_json::Value>),
    Timeout,
    Network,
}

struct ServerState {
    draft: Option<Draft>,
    /// Logical clock; each mutation advances updated_at by one second.
    tick: i64,
    next_id: u64,
    inject: Option<Inject>,
    fail_fetch: bool,
    flag_warning: bool,
}

/// In-memory draft server honoring the drafts HTTP contract:
/// optimistic-concurrency via `If-Unmodified-Since`, 409 bodies carrying
/// the server's current draft, 404 once the draft is gone.
pub struct FakeApi {
    pub calls: Mutex<Vec<ApiCall>>,
    state: Mutex<ServerState>,
    latency: Mutex<Duration>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            state: Mutex::new(ServerState {
                draft: None,
                tick: 0,
                next_id: 1,
                inject: None,
                fail_fetch: false,
                flag_warning: false,
            }),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn now(tick: i64) -> DateTime<Utc> {
        Self::base_time() + ChronoDuration::seconds(tick)
    }

    /// Fails the next request with the given error.
    pub fn inject(&self, inject: Inject) {
        self.state.lock().unwrap().inject = Some(inject);
    }

    /// Makes `fetch` fail with a network error until reset.
    pub fn set_fail_fetch(&self, fail: bool) {
        self.state.lock().unwrap().fail_fetch = fail;
    }

    /// Accepts the next write but flags the client's view as stale,
    /// i.e. a 2xx response carrying `conflict_warning: true`.
    pub fn flag_conflict_warning(&self) {
        self.state.lock().unwrap().flag_warning = true;
    }

    /// Simulates a concurrent edit from another session: applies the
    /// payload server-side and advances the last-modified timestamp.
    pub fn remote_edit(&self, payload: &DraftPayload) {
        let mut state = self.state.lock().unwrap();
        state.tick += 1;
        let now = Self::now(state.tick);
        let draft = state.draft.as_mut().expect("no draft to edit remotely");
        draft.title = payload.title.clone();
        draft.body = payload.body.clone();
        draft.metadata = payload.metadata.clone();
        draft.updated_at = Some(now);
    }

    /// Deletes the draft server-side out from under the client.
    pub fn remote_delete(&self) {
        self.state.lock().unwrap().draft = None;
    }

    /// Current server-side draft, if any.
    pub fn server_draft(&self) -> Option<Draft> {
        self.state.lock().unwrap().draft.clone()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Adds a fixed delay to every request; useful with a paused clock
    /// to hold a save in flight.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    async fn delay(&self) {
        let latency = *self.latency.lock().unwrap();
        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_inject(&self) -> Option<ApiError> {
        match self.state.lock().unwrap().inject.take() {
            Some(Inject::Status(status, body)) => Some(ApiError::Status { status, body }),
            Some(Inject::Timeout) => Some(ApiError::Timeout),
            Some(Inject::Network) => Some(ApiError::Network("connection reset".to_string())),
            None => None,
        }
    }
}

#[async_trait]
impl DraftApi for FakeApi {
    async fn create(&self, payload: &DraftPayload) -> Result<Draft, ApiError> {
        self.calls.lock().unwrap().push(ApiCall::Create);
        self.delay().await;
        if let Some(err) = self.take_inject() {
            return Err(err);
        }

        let mut state = self.state.lock().unwrap();
        state.tick += 1;
        let now = Self::now(state.tick);
        let draft = Draft {
            id: state.next_id.to_string(),
            parent_id: payload.parent_id.clone(),
            owner_id: 1,
            title: payload.title.clone(),
            body: payload.body.clone(),
            metadata: payload.metadata.clone(),
            status: DraftDocStatus::Active,
            created_at: Some(now),
            updated_at: Some(now),
            expires_at: Some(now + ChronoDuration::days(30)),
            conflict_warning: false,
        };
        state.next_id += 1;
        state.draft = Some(draft.clone());
        let mut returned = draft;
        if state.flag_warning {
            state.flag_warning = false;
            returned.conflict_warning = true;
        }
        Ok(returned)
    }

    async fn update(
        &self,
        id: &str,
        payload: &DraftPayload,
        if_unmodified_since: Option<&str>,
    ) -> Result<Draft, ApiError> {
        self.calls.lock().unwrap().push(ApiCall::Update {
            id: id.to_string(),
            token: if_unmodified_since.map(str::to_string),
        });
        self.delay().await;
        if let Some(err) = self.take_inject() {
            return Err(err);
        }

        let mut state = self.state.lock().unwrap();
        let current = match &state.draft {
            Some(draft) if draft.id == id => draft.clone(),
            _ => return Err(ApiError::Status { status: 404, body: None }),
        };

        if let Some(token) = if_unmodified_since {
            let presented = DateTime::parse_from_rfc3339(token)
                .map(|ts| ts.with_timezone(&Utc))
                .ok();
            let server_ts = current.updated_at;
            if let (Some(presented), Some(server_ts)) = (presented, server_ts) {
                if server_ts > presented {
                    let mut stale = current.clone();
                    stale.conflict_warning = true;
                    let body = serde_json::json!({
                        "draft": serde_json::to_value(&stale).unwrap()
                    });
                    return Err(ApiError::Status { status: 409, body: Some(body) });
                }
            }
        }

        state.tick += 1;
        let now = Self::now(state.tick);
        let draft = state.draft.as_mut().unwrap();
        draft.title = payload.title.clone();
        draft.body = payload.body.clone();
        draft.metadata = payload.metadata.clone();
        draft.parent_id = payload.parent_id.clone();
        draft.updated_at = Some(now);
        draft.conflict_warning = false;
        let mut returned = draft.clone();
        if state.flag_warning {
            state.flag_warning = false;
            returned.conflict_warning = true;
        }
        Ok(returned)
    }

    async fn fetch(&self, id: &str) -> Result<Draft, ApiError> {
        self.calls.lock().unwrap().push(ApiCall::Fetch { id: id.to_string() });
        self.delay().await;
        if self.state.lock().unwrap().fail_fetch {
            return Err(ApiError::Network("connection reset".to_string()));
        }
        if let Some(err) = self.take_inject() {
            return Err(err);
        }

        match &self.state.lock().unwrap().draft {
            Some(draft) if draft.id == id => Ok(draft.clone()),
            _ => Err(ApiError::Status { status: 404, body: None }),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(ApiCall::Delete { id: id.to_string() });
        self.delay().await;
        if let Some(err) = self.take_inject() {
            return Err(err);
        }

        let mut state = self.state.lock().unwrap();
        match &state.draft {
            Some(draft) if draft.id == id => {
                state.draft = None;
                Ok(())
            }
            _ => Err(ApiError::Status { status: 404, body: None }),
        }
    }
}

/// Metric sink that records every event for assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<MetricEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name).collect()
    }
}

impl MetricSink for RecordingSink {
    fn emit(&self, event: &MetricEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Installs a test subscriber once so `RUST_LOG` surfaces controller
/// traces during debugging.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Config pointing the mirror at a temp directory, with the default
/// debounce/heartbeat cadence.
pub fn test_config(data_dir: &Path) -> AutosaveConfig {
    AutosaveConfig {
        server_url: "http://localhost:0".to_string(),
        data_dir: data_dir.to_path_buf(),
        ..AutosaveConfig::default()
    }
}

/// Lets spawned controller tasks run to completion at the current
/// instant of the paused clock.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
