use thiserror::Error;

/// Violations of a domain rule.  These are recovered at the API boundary and
/// turned into user-facing messages; none of them is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input: negative budget, past deadline, oversized file...
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The caller lacks the required role or ownership.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested state transition is not allowed from the current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Another tutor won the race, or the offering was already taken.
    #[error("Offering has already been accepted")]
    AlreadyAccepted,

    /// Only verified tutors may accept offerings.
    #[error("Tutor is not verified")]
    NotVerified,

    /// Offerings can only be edited while pending.
    #[error("Offering can no longer be edited")]
    NotEditable,

    /// The record does not exist or has been deleted.
    #[error("{0} not found")]
    NotFound(&'static str),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
