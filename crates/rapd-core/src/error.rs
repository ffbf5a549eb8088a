use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("no launch adapter registered under {key:?} (known: {known})")]
    NoAdapter { key: String, known: String },

    #[error("wire error: {0}")]
    Wire(#[from] crate::wire::WireError),

    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
}
