use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::store::{Record, SharedStore, StoreError};

enum Slot {
    List(VecDeque<String>),
    Record { fields: Record, expires: Instant },
}

impl Slot {
    fn kind(&self) -> &'static str {
        match self {
            Slot::List(_) => "list",
            Slot::Record { .. } => "record",
        }
    }

    fn expired(&self, now: Instant) -> bool {
        matches!(self, Slot::Record { expires, .. } if *expires <= now)
    }
}

/// In-process [`SharedStore`].
///
/// Every operation takes one lock, which makes pops atomic across tasks. Expired records are
/// dropped lazily when they are next touched.
#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<BTreeMap<String, Slot>>,
    down: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`StoreError::Unavailable`] until switched back.
    pub fn set_available(&self, available: bool) {
        self.down.store(!available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

fn wrong_type(key: &str, expected: &'static str, slot: &Slot) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected,
        found: slot.kind(),
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn push(&self, list: &str, value: String) -> Result<(), StoreError> {
        self.check()?;
        let mut slots = self.slots.lock().await;
        match slots
            .entry(list.to_string())
            .or_insert_with(|| Slot::List(VecDeque::new()))
        {
            Slot::List(items) => {
                items.push_back(value);
                Ok(())
            }
            other => Err(wrong_type(list, "list", other)),
        }
    }

    async fn pop_oldest(&self, list: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        let mut slots = self.slots.lock().await;
        let (item, drained) = match slots.get_mut(list) {
            None => return Ok(None),
            Some(Slot::List(items)) => (items.pop_front(), items.is_empty()),
            Some(other) => return Err(wrong_type(list, "list", other)),
        };
        if drained {
            slots.remove(list);
        }
        Ok(item)
    }

    async fn len(&self, list: &str) -> Result<usize, StoreError> {
        self.check()?;
        let slots = self.slots.lock().await;
        match slots.get(list) {
            None => Ok(0),
            Some(Slot::List(items)) => Ok(items.len()),
            Some(other) => Err(wrong_type(list, "list", other)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check()?;
        self.slots.lock().await.remove(key);
        Ok(())
    }

    async fn put_record(&self, key: &str, fields: Record, ttl: Duration) -> Result<(), StoreError> {
        self.check()?;
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        if slots.get(key).is_some_and(|s| s.expired(now)) {
            slots.remove(key);
        }
        match slots.entry(key.to_string()).or_insert_with(|| Slot::Record {
            fields: Record::new(),
            expires: now,
        }) {
            Slot::Record {
                fields: current,
                expires,
            } => {
                current.extend(fields);
                *expires = now + ttl;
                Ok(())
            }
            other => Err(wrong_type(key, "record", other)),
        }
    }

    async fn record(&self, key: &str) -> Result<Option<Record>, StoreError> {
        self.check()?;
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        if slots.get(key).is_some_and(|s| s.expired(now)) {
            slots.remove(key);
        }
        match slots.get(key) {
            None => Ok(None),
            Some(Slot::Record { fields, .. }) => Ok(Some(fields.clone())),
            Some(other) => Err(wrong_type(key, "record", other)),
        }
    }

    async fn records(&self, prefix: &str) -> Result<Vec<(String, Record)>, StoreError> {
        self.check()?;
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        slots.retain(|_, slot| !slot.expired(now));

        let live = slots
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter_map(|(key, slot)| match slot {
                Slot::Record { fields, .. } => Some((key.clone(), fields.clone())),
                Slot::List(_) => None,
            })
            .collect();
        Ok(live)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("available", &!self.down.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Length of every non-empty list.
    pub async fn list_sizes(&self) -> HashMap<String, usize> {
        self.slots
            .lock()
            .await
            .iter()
            .filter_map(|(k, s)| match s {
                Slot::List(items) => Some((k.clone(), items.len())),
                Slot::Record { .. } => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn list_is_fifo() {
        let store = MemoryStore::new();
        for v in ["a", "b", "c"] {
            store.push("images", v.to_string()).await.unwrap();
        }
        assert_eq!(store.len("images").await.unwrap(), 3);
        assert_eq!(store.pop_oldest("images").await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.pop_oldest("images").await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.pop_oldest("images").await.unwrap().as_deref(), Some("c"));
        assert_eq!(store.pop_oldest("images").await.unwrap(), None);
        assert_eq!(store.len("images").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_pops_never_share_an_entry() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..200 {
            store.push("images", i.to_string()).await.unwrap();
        }

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(v) = store.pop_oldest("images").await.unwrap() {
                    got.push(v);
                    tokio::task::yield_now().await;
                }
                got
            }));
        }

        let mut all = Vec::new();
        for t in tasks {
            all.extend(t.await.unwrap());
        }
        all.sort_by_key(|v| v.parse::<u32>().unwrap());
        let expected: Vec<String> = (0..200).map(|i| i.to_string()).collect();
        assert_eq!(all, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn records_expire_unless_refreshed() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(30);
        let mut fields = Record::new();
        fields.insert("ow_type".into(), json!("launcher"));
        store.put_record("OW:a", fields.clone(), ttl).await.unwrap();
        store.put_record("OW:b", fields, ttl).await.unwrap();

        tokio::time::advance(Duration::from_secs(20)).await;
        store.put_record("OW:a", Record::new(), ttl).await.unwrap();

        tokio::time::advance(Duration::from_secs(15)).await;
        let live = store.records("OW:").await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].0, "OW:a");
        assert_eq!(live[0].1["ow_type"], json!("launcher"));
        assert_eq!(store.record("OW:b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn records_are_filtered_by_prefix() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(30);
        store.put_record("OW:1", Record::new(), ttl).await.unwrap();
        store.put_record("OW:1:launcher", Record::new(), ttl).await.unwrap();
        store.put_record("OTHER", Record::new(), ttl).await.unwrap();
        store.push("OW:list", "x".into()).await.unwrap();

        let keys: Vec<String> = store.records("OW:").await.unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["OW:1".to_string(), "OW:1:launcher".to_string()]);
    }

    #[tokio::test]
    async fn type_mismatch_is_reported() {
        let store = MemoryStore::new();
        store.push("k", "v".into()).await.unwrap();
        let err = store.put_record("k", Record::new(), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::WrongType { expected: "record", found: "list", .. }));
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(matches!(store.push("l", "v".into()).await, Err(StoreError::Unavailable(_))));
        store.set_available(true);
        store.push("l", "v".into()).await.unwrap();
        assert_eq!(store.list_sizes().await.get("l"), Some(&1));
    }
}
