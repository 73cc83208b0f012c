pub mod access;
pub mod identity;
pub mod mail;
pub mod payment;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Configuration missing: {0}")]
    ConfigurationError(String),
    #[error("Access denied: {0}")]
    AccessDenied(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
