//! Shared key-value store the beamline side writes into and monitors read from.
//!
//! Two shapes are used: FIFO lists of strings (image and run announcements) and expiring
//! records (overwatch registrations). A list pop is atomic, so any number of consumers can
//! drain the same list without seeing an entry twice.

mod memory;
pub use memory::MemoryStore;

#[cfg(feature = "redis")]
mod remote;
#[cfg(feature = "redis")]
pub use remote::RedisStore;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Field map of an expiring record.
pub type Record = Map<String, Value>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("key {key:?} holds a {found}, not a {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

#[async_trait]
pub trait SharedStore: Send + Sync + 'static {
    /// Add `value` at the newest end of `list`.
    async fn push(&self, list: &str, value: String) -> Result<(), StoreError>;

    /// Remove and return the oldest entry of `list`.
    async fn pop_oldest(&self, list: &str) -> Result<Option<String>, StoreError>;

    async fn len(&self, list: &str) -> Result<usize, StoreError>;

    /// Drop a list or record. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Merge `fields` into the record at `key` and restart its time to live.
    async fn put_record(&self, key: &str, fields: Record, ttl: Duration) -> Result<(), StoreError>;

    async fn record(&self, key: &str) -> Result<Option<Record>, StoreError>;

    /// Live records whose key starts with `prefix`, ordered by key.
    async fn records(&self, prefix: &str) -> Result<Vec<(String, Record)>, StoreError>;
}
