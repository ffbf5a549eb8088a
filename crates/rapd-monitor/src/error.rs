use rapd_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor has no site tags to watch")]
    NoTags,

    #[error("notification receiver is gone")]
    NotifierClosed,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
