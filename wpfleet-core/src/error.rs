use thiserror::Error;

/// The error taxonomy shared by the state store, orchestrators, and the API
/// layer. Every fallible operation in this crate returns one of these kinds
/// rather than a bare string or a third-party error type, so callers at
/// every layer can match on the same set of variants.
#[derive(Error, Debug)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("site not found: {0}")]
    SiteNotFound(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("domain already claimed: {0}")]
    DomainTaken(String),

    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: crate::models::SiteStatus,
        to: crate::models::SiteStatus,
    },

    #[error("{subsystem} adapter error: {underlying}")]
    Adapter {
        subsystem: &'static str,
        underlying: String,
    },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    pub fn adapter(subsystem: &'static str, underlying: impl std::fmt::Display) -> Self {
        Error::Adapter {
            subsystem,
            underlying: underlying.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
