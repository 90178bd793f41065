//! Controller error types
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// A write carried a stale resourceVersion.
    #[error("conflict writing {0}, object was modified")]
    Conflict(String),

    /// Per-node dispatch failures, collected so one bad node does not hide the rest.
    #[error("dispatch failed on {} node(s): {}", .0.len(), .0.join("; "))]
    Dispatch(Vec<String>),

    #[error("object is missing {0}")]
    MissingObjectKey(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for optimistic-concurrency failures that a quick retry resolves
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict(_) => true,
            Self::Kube(kube::Error::Api(ae)) => ae.code == 409,
            _ => false,
        }
    }
}
