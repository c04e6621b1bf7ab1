use thiserror::Error;

/// Errors raised while parsing or constructing domain types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("Unknown subsystem: {0}")]
    UnknownSubsystem(String),

    #[error("Unknown service status: {0}")]
    UnknownStatus(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

pub type TypesResult<T> = Result<T, TypesError>;
