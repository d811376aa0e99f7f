use thiserror::Error;

/// Failure classes for generative/search calls. The executor handles each
/// class differently: quota rotates credentials, overload raises the shared
/// cooldown, malformed/missing-fields flow into the bounded retry, and the
/// two credential variants are fatal for the current run.
#[derive(Error, Debug)]
pub enum GenError {
    #[error("Quota or authorization failure: {0}")]
    Quota(String),

    #[error("Service overloaded: {0}")]
    Overloaded(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Response missing required fields: {0:?}")]
    MissingFields(Vec<String>),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("No generative credentials configured")]
    NoCredentials,

    #[error("All generative credentials exhausted")]
    KeysExhausted,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GenError {
    /// Fatal errors abort the current run immediately instead of retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GenError::NoCredentials | GenError::KeysExhausted)
    }
}
