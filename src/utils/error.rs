use log::SetLoggerError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WakeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Mission error: {0}")]
    Mission(String),

    #[error("Step error: {0}")]
    Step(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Logging error: {0}")]
    Logging(#[from] SetLoggerError),
}

pub type Result<T> = std::result::Result<T, WakeError>;
