use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("job command does not unpack: {0}")]
    Unpack(String),

    #[error("job command has {found} fields, expected {expected}")]
    Arity { expected: usize, found: usize },

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
