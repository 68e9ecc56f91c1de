use std::time::{Duration, SystemTime, UNIX_EPOCH};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    supportdesk_common::{ChannelKind, EscalationDecision},
    tracing::{debug, warn},
};

use crate::{
    error::{Error, Result},
    key::session_id_for,
};

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// One conversation thread on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub channel_kind: ChannelKind,
    pub external_thread_key: String,
    pub created_at: u64,
    #[serde(default)]
    pub last_run_id: Option<String>,
}

impl Session {
    pub fn new(channel_kind: ChannelKind, external_thread_key: impl Into<String>) -> Self {
        let external_thread_key = external_thread_key.into();
        Self {
            session_id: session_id_for(channel_kind, &external_thread_key),
            channel_kind,
            external_thread_key,
            created_at: now_ms(),
            last_run_id: None,
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Posted,
    Escalated,
    Failed { detail: String },
}

/// Record of one processed turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    #[serde(default)]
    pub escalation: Option<EscalationDecision>,
    pub outcome: RunOutcome,
    pub recorded_at: u64,
}

impl RunState {
    pub fn new(escalation: Option<EscalationDecision>, outcome: RunOutcome) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            escalation,
            outcome,
            recorded_at: now_ms(),
        }
    }
}

/// Persistence for sessions, their history and their run records.
///
/// History entries are opaque JSON chat messages; the store never
/// interprets them.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<Session>>;

    /// Insert a new session. Fails with [`Error::AlreadyExists`] if the id is
    /// taken.
    async fn create(&self, session: Session) -> Result<Session>;

    /// Store `run` and point `last_run_id` at it.
    async fn record_run(&self, session_id: &str, run: RunState) -> Result<()>;

    async fn runs(&self, session_id: &str) -> Result<Vec<RunState>>;

    async fn append_history(&self, session_id: &str, messages: &[Value]) -> Result<()>;

    async fn history(&self, session_id: &str) -> Result<Vec<Value>>;
}

const CREATE_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Fetch the session for a thread, creating it on first sight.
///
/// A lost creation race or a transient store error is retried up to
/// `max_attempts` times before giving up with [`Error::CreationConflict`].
pub async fn get_or_create(
    store: &dyn SessionStore,
    kind: ChannelKind,
    external_thread_key: &str,
    max_attempts: u32,
) -> Result<Session> {
    let session_id = session_id_for(kind, external_thread_key);
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match store.get(&session_id).await {
            Ok(Some(session)) => return Ok(session),
            Ok(None) => {},
            Err(e) => {
                warn!(session_id = %session_id, attempt, error = %e, "session fetch failed");
                tokio::time::sleep(CREATE_RETRY_DELAY).await;
                continue;
            },
        }
        match store.create(Session::new(kind, external_thread_key)).await {
            Ok(session) => {
                debug!(session_id = %session_id, kind = %kind, "session created");
                return Ok(session);
            },
            Err(Error::AlreadyExists { .. }) => {
                debug!(session_id = %session_id, attempt, "session created concurrently, refetching");
            },
            Err(e) => {
                warn!(session_id = %session_id, attempt, error = %e, "session create failed");
                tokio::time::sleep(CREATE_RETRY_DELAY).await;
            },
        }
    }
    Err(Error::CreationConflict {
        session_id,
        attempts: max_attempts,
    })
}
