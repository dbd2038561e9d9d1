use crate::events::EventValidationError;

// ============================================================================
// Patient Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PatientError {
    #[error("Patient not found: {0}")]
    NotFound(String),

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Social Security Number already exists")]
    SsnAlreadyExists,

    #[error("Patient event rejected: {0}")]
    InvalidEvent(#[from] EventValidationError),

    #[error("Patient store failure: {0}")]
    Storage(#[from] anyhow::Error),
}
