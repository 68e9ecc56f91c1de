//! Directory-backed session store.
//!
//! Layout under the base directory:
//!
//! ```text
//! <session_id>/session.json   metadata
//! <session_id>/history.jsonl  one chat message per line
//! <session_id>/runs.jsonl     one RunState per line
//! ```
//!
//! A new `session.json` is written in full to a temp file and then claimed
//! with a hard link, which fails if the file exists. Two processes racing on
//! the same thread still produce a single session, and readers never see a
//! half-written file. Appends take an exclusive file lock.

use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, ErrorKind, Write},
    path::{Path, PathBuf},
};

use {
    async_trait::async_trait,
    fd_lock::RwLock as FileLock,
    serde::{Serialize, de::DeserializeOwned},
    serde_json::Value,
    tokio::sync::Mutex,
    tracing::{debug, warn},
    uuid::Uuid,
};

use crate::{
    error::{Error, Result},
    store::{RunState, Session, SessionStore},
};

const SESSION_FILE: &str = "session.json";
const HISTORY_FILE: &str = "history.jsonl";
const RUNS_FILE: &str = "runs.jsonl";

pub struct FileSessionStore {
    base_dir: PathBuf,
    /// Serialises metadata rewrites within this process.
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn dir_for(&self, session_id: &str) -> PathBuf {
        // Ids are UUIDs, but never let a caller escape the base dir.
        let safe: String = session_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.base_dir.join(safe)
    }
}

/// Empty or corrupt metadata reads as absent so the next create replaces it.
fn read_session(path: &Path) -> Result<Option<Session>> {
    match fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str(&data) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable session file treated as absent");
                Ok(None)
            },
        },
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_synced(path: &Path, session: &Session) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(serde_json::to_string_pretty(session)?.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

fn claim_session_file(dir: &Path, session: &Session) -> Result<()> {
    let path = dir.join(SESSION_FILE);
    let tmp = dir.join(format!("{SESSION_FILE}.{}.tmp", Uuid::new_v4()));
    let claimed = write_synced(&tmp, session).and_then(|()| match fs::hard_link(&tmp, &path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => match read_session(&path)? {
            Some(_) => Err(Error::already_exists(&session.session_id)),
            None => {
                warn!(path = %path.display(), "replacing unreadable session file");
                fs::rename(&tmp, &path)?;
                Ok(())
            },
        },
        Err(e) => Err(e.into()),
    });
    if tmp.exists()
        && let Err(e) = fs::remove_file(&tmp)
    {
        debug!(path = %tmp.display(), error = %e, "temp session file not removed");
    }
    claimed
}

fn append_lines<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let mut buf = String::new();
    for item in items {
        buf.push_str(&serde_json::to_string(item)?);
        buf.push('\n');
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut lock = FileLock::new(file);
    let mut guard = lock
        .write()
        .map_err(|e| Error::lock_failed(e.to_string()))?;
    guard.write_all(buf.as_bytes())?;
    Ok(())
}

fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(e.into()),
    };
    let mut items = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str(trimmed) {
            Ok(val) => items.push(val),
            Err(e) => {
                warn!(path = %path.display(), "skipping malformed JSONL line: {e}");
            },
        }
    }
    Ok(items)
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        let path = self.dir_for(session_id).join(SESSION_FILE);
        tokio::task::spawn_blocking(move || read_session(&path)).await?
    }

    async fn create(&self, session: Session) -> Result<Session> {
        let dir = self.dir_for(&session.session_id);
        tokio::task::spawn_blocking(move || -> Result<Session> {
            fs::create_dir_all(&dir)?;
            claim_session_file(&dir, &session)?;
            debug!(session_id = %session.session_id, dir = %dir.display(), "session file created");
            Ok(session)
        })
        .await?
    }

    async fn record_run(&self, session_id: &str, run: RunState) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let dir = self.dir_for(session_id);
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let path = dir.join(SESSION_FILE);
            let mut session = read_session(&path)?.ok_or_else(|| Error::not_found(&session_id))?;
            append_lines(&dir.join(RUNS_FILE), std::slice::from_ref(&run))?;
            session.last_run_id = Some(run.run_id);
            let tmp = dir.join(format!("{SESSION_FILE}.tmp"));
            fs::write(&tmp, serde_json::to_string_pretty(&session)?)?;
            fs::rename(&tmp, &path)?;
            Ok(())
        })
        .await?
    }

    async fn runs(&self, session_id: &str) -> Result<Vec<RunState>> {
        let path = self.dir_for(session_id).join(RUNS_FILE);
        tokio::task::spawn_blocking(move || read_lines(&path)).await?
    }

    async fn append_history(&self, session_id: &str, messages: &[Value]) -> Result<()> {
        let dir = self.dir_for(session_id);
        let session_id = session_id.to_string();
        let messages = messages.to_vec();
        tokio::task::spawn_blocking(move || -> Result<()> {
            if !dir.join(SESSION_FILE).exists() {
                return Err(Error::not_found(session_id));
            }
            append_lines(&dir.join(HISTORY_FILE), &messages)
        })
        .await?
    }

    async fn history(&self, session_id: &str) -> Result<Vec<Value>> {
        let path = self.dir_for(session_id).join(HISTORY_FILE);
        tokio::task::spawn_blocking(move || read_lines(&path)).await?
    }
}
