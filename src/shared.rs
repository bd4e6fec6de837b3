use thiserror::Error;
use tracing::warn;

use crate::room::models::RoomId;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Room code already in use: {0}")]
    DuplicateCode(String),

    #[error("Backing store unreachable: {0}")]
    Connectivity(String),

    #[error("Index {index} out of range (length {len})")]
    OutOfRangeIndex { index: usize, len: usize },

    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    #[error("Invalid room id: {0}")]
    InvalidRoomId(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Classifies a sqlx failure into the store's error kinds.
    ///
    /// Unique violations (SQLSTATE 23505) become `DuplicateCode`, transport-level
    /// failures become `Connectivity`, everything else is a `DatabaseError`.
    pub fn from_sqlx(err: sqlx::Error, rp_code: Option<&str>) -> Self {
        let mapped = match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                AppError::DuplicateCode(rp_code.unwrap_or_default().to_string())
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => AppError::Connectivity(err.to_string()),
            _ => AppError::DatabaseError(err.to_string()),
        };
        warn!(error = %err, kind = ?mapped, "Backing store call failed");
        mapped
    }

    /// True for failures that a later call might not hit again.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Connectivity(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::DatabaseError(format!("Malformed document: {}", err))
    }
}
