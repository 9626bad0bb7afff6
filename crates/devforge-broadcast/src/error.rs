use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BroadcastError>;
