use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Credential store error: {0}")]
    Credential(String),
    #[error("Corrupt stored state: {0}")]
    CorruptState(String),
    #[error("OAuth error: {0}")]
    OAuth(String),
    #[error("Google authentication expired: {0}")]
    AuthExpired(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("a submission is already in progress")]
    SubmissionInProgress,
}
