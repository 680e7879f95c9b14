//! Store error types.

use std::path::PathBuf;

use uuid::Uuid;

/// Errors that can occur during store operations.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Failed to open or create database.
    #[error("Failed to open database at {path}: {source}")]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Failed to execute SQL.
    #[error("Database query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// Blocking task was cancelled.
    #[error("Blocking task cancelled")]
    TaskCancelled,

    /// Failed to create parent directory.
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No agent with this ID.
    #[error("Agent {0} not found")]
    AgentNotFound(Uuid),

    /// No session with this ID.
    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    /// Session was ended before the write landed.
    #[error("Session {0} has already ended")]
    SessionEnded(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_open_display() {
        let err = StoreError::DatabaseOpen {
            path: PathBuf::from("/tmp/pupil.db"),
            source: rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some("test".to_string()),
            ),
        };
        assert!(err.to_string().contains("Failed to open database"));
        assert!(err.to_string().contains("/tmp/pupil.db"));
    }

    #[test]
    fn test_not_found_display() {
        let id = Uuid::nil();
        assert_eq!(
            StoreError::AgentNotFound(id).to_string(),
            format!("Agent {id} not found")
        );
        assert_eq!(
            StoreError::SessionNotFound(id).to_string(),
            format!("Session {id} not found")
        );
    }
}
