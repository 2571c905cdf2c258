//! Types d'erreurs pour pmoplayout

/// Erreurs du moteur de playout
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Commit failed: {0}")]
    CommitFailure(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Error::InvariantViolation(message.into())
    }

    /// Code visible par le client (404 / 403 / 500)
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::InvalidState(_) => 403,
            _ => 500,
        }
    }

    /// Seul un échec de commit peut être rejoué depuis le début
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::CommitFailure(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

/// Type Result spécialisé pour pmoplayout
pub type Result<T> = std::result::Result<T, Error>;
