use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] pawsome_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Post ID cannot be empty")]
    EmptyPostId,
    #[error("Invalid post ID: {0}")]
    InvalidPostId(String),
    #[error("Post not found: {0}")]
    PostNotFound(String),
    #[error("Nothing to edit; pass at least one field")]
    EmptyEdit,
    #[error("Cannot both set and clear {0}")]
    ConflictingEdit(&'static str),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Remote store is not configured. Set FIRESTORE_PROJECT_ID (and FIRESTORE_ID_TOKEN if your rules require sign-in)."
    )]
    RemoteNotConfigured,
}
