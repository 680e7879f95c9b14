//! Session orchestration error types.

use uuid::Uuid;

use crate::store::StoreError;

/// Errors that can occur while running a teaching session.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// Persistence failed or the referenced entity does not exist.
    #[error(transparent)]
    Store(StoreError),

    /// Concept is not part of the curriculum.
    #[error("Unknown concept: {0}")]
    UnknownConcept(String),

    /// Session has already ended.
    #[error("Session {0} has ended")]
    SessionClosed(Uuid),

    /// Teacher message was empty.
    #[error("Teaching message must not be empty")]
    EmptyMessage,
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SessionEnded(id) => Self::SessionClosed(id),
            other => Self::Store(other),
        }
    }
}

impl SessionError {
    /// Whether the error refers to a missing agent or session.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::AgentNotFound(_) | StoreError::SessionNotFound(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_concept_display() {
        let err = SessionError::UnknownConcept("Monads".to_string());
        assert_eq!(err.to_string(), "Unknown concept: Monads");
    }

    #[test]
    fn test_store_error_is_transparent() {
        let id = Uuid::nil();
        let err = SessionError::from(StoreError::AgentNotFound(id));
        assert_eq!(err.to_string(), format!("Agent {id} not found"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_store_session_ended_maps_to_closed() {
        let id = Uuid::new_v4();
        let err = SessionError::from(StoreError::SessionEnded(id));
        assert!(matches!(err, SessionError::SessionClosed(closed) if closed == id));
    }

    #[test]
    fn test_closed_is_not_not_found() {
        assert!(!SessionError::SessionClosed(Uuid::nil()).is_not_found());
        assert!(!SessionError::EmptyMessage.is_not_found());
    }
}
