use std::fmt::Display;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for [`CoreError::NotFound`] with any displayable id.
    pub fn not_found(entity: &'static str, id: impl Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the caller may re-read and retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_includes_entity_and_id() {
        let err = CoreError::not_found("Item", "abc");
        assert_eq!(err.to_string(), "Entity not found: Item with id abc");
    }

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(CoreError::Conflict("stale".into()).is_retryable());
        assert!(!CoreError::Validation("bad".into()).is_retryable());
        assert!(!CoreError::Internal("boom".into()).is_retryable());
    }
}
