use rapd_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OverwatchError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    Config(String),
}
