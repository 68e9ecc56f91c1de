use std::collections::HashMap;

use {async_trait::async_trait, serde_json::Value, tokio::sync::RwLock};

use crate::{
    error::{Error, Result},
    store::{RunState, Session, SessionStore},
};

#[derive(Default)]
struct Record {
    session: Option<Session>,
    history: Vec<Value>,
    runs: Vec<RunState>,
}

/// Process-local store. Contents are lost on exit.
#[derive(Default)]
pub struct InMemorySessionStore {
    records: RwLock<HashMap<String, Record>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions created so far.
    pub async fn len(&self) -> usize {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.session.is_some())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self
            .records
            .read()
            .await
            .get(session_id)
            .and_then(|r| r.session.clone()))
    }

    async fn create(&self, session: Session) -> Result<Session> {
        let mut records = self.records.write().await;
        let record = records.entry(session.session_id.clone()).or_default();
        if record.session.is_some() {
            return Err(Error::already_exists(session.session_id));
        }
        record.session = Some(session.clone());
        Ok(session)
    }

    async fn record_run(&self, session_id: &str, run: RunState) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(session_id)
            .filter(|r| r.session.is_some())
            .ok_or_else(|| Error::not_found(session_id))?;
        if let Some(session) = record.session.as_mut() {
            session.last_run_id = Some(run.run_id.clone());
        }
        record.runs.push(run);
        Ok(())
    }

    async fn runs(&self, session_id: &str) -> Result<Vec<RunState>> {
        Ok(self
            .records
            .read()
            .await
            .get(session_id)
            .map(|r| r.runs.clone())
            .unwrap_or_default())
    }

    async fn append_history(&self, session_id: &str, messages: &[Value]) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(session_id)
            .filter(|r| r.session.is_some())
            .ok_or_else(|| Error::not_found(session_id))?;
        record.history.extend_from_slice(messages);
        Ok(())
    }

    async fn history(&self, session_id: &str) -> Result<Vec<Value>> {
        Ok(self
            .records
            .read()
            .await
            .get(session_id)
            .map(|r| r.history.clone())
            .unwrap_or_default())
    }
}
