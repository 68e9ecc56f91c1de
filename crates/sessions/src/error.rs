use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("session {session_id} already exists")]
    AlreadyExists { session_id: String },

    #[error("session {session_id} not found")]
    NotFound { session_id: String },

    #[error("could not create session {session_id} after {attempts} attempts")]
    CreationConflict { session_id: String, attempts: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),

    #[error("file lock failed: {message}")]
    Lock { message: String },
}

impl Error {
    #[must_use]
    pub fn lock_failed(message: impl Into<String>) -> Self {
        Self::Lock {
            message: message.into(),
        }
    }

    pub fn not_found(session_id: impl Into<String>) -> Self {
        Self::NotFound {
            session_id: session_id.into(),
        }
    }

    pub fn already_exists(session_id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            session_id: session_id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
