use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutopressError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Evidence error: {0}")]
    Evidence(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
