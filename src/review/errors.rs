use thiserror::Error;

/// Errors surfaced by review operations.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("User {user_id} is not authorized to modify {resource}")]
    Unauthorized { user_id: String, resource: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Metadata provider error: {0}")]
    Upstream(#[source] anyhow::Error),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl ReviewError {
    /// HTTP status equivalent for the transport layer.
    pub fn status_code(&self) -> u16 {
        match self {
            ReviewError::NotFound(_) => 404,
            ReviewError::Conflict(_) | ReviewError::InvalidInput(_) => 400,
            ReviewError::Unauthorized { .. } => 403,
            ReviewError::Upstream(_) => 502,
            ReviewError::Store(_) => 500,
        }
    }
}

pub type ReviewResult<T> = std::result::Result<T, ReviewError>;
