use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// A collaborator (buffer store or flush queue) was never initialized.
    #[error("Dependency unavailable: {0}")]
    Unavailable(String),

    #[error("Buffer store error: {0}")]
    Store(String),

    #[error("Flush queue error: {0}")]
    Queue(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Flush handler failed: {0}")]
    Handler(String),
}

impl IngestError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, IngestError::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
