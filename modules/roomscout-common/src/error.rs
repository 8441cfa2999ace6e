use thiserror::Error;

/// Failure classes of the ingestion pipeline.
///
/// Only `Input`, or a `Transport` failure while resolving the dataset, ends a
/// batch. Every other class is recorded against a single post.
#[derive(Error, Debug)]
pub enum RoomScoutError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Listing {0} already exists")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}


impl RoomScoutError {
    /// The message recorded against a post, without the class prefix.
    pub fn detail(&self) -> String {
        match self {
            RoomScoutError::Input(m)
            | RoomScoutError::Validation(m)
            | RoomScoutError::RateLimit(m)
            | RoomScoutError::Transport(m)
            | RoomScoutError::Database(m) => m.clone(),
            RoomScoutError::Conflict(_) => "Already exists in database".to_string(),
            RoomScoutError::Anyhow(e) => e.to_string(),
        }
    }
}
