use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rapd_core::{Record, SharedStore, host_info, uptime};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::{OVERWATCH_PREFIX, OverwatchConfig, OverwatchError};

/// Custom field that names the job list a launcher serves.
pub const JOB_LIST_FIELD: &str = "job_list";

/// Liveness entry of one process in the shared store.
///
/// Entries expire on their own; a process that stops refreshing simply disappears.
pub struct Registrar {
    store: Arc<dyn SharedStore>,
    cfg: OverwatchConfig,
    uuid: String,
}

/// A live process as seen by [`Registrar::discover`].
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEntry {
    pub id: String,
    pub ow_type: String,
    pub ow_id: Option<String>,
    /// Unix seconds of the last refresh.
    pub timestamp: f64,
    pub fields: Record,
}

impl Registrar {
    pub fn new(store: Arc<dyn SharedStore>, cfg: OverwatchConfig) -> Self {
        Self {
            store,
            cfg,
            uuid: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn id(&self) -> &str {
        &self.uuid
    }

    pub fn config(&self) -> &OverwatchConfig {
        &self.cfg
    }

    pub fn key(&self) -> String {
        format!("{OVERWATCH_PREFIX}{}", self.uuid)
    }

    /// First write of this process's entry.
    pub async fn register(&self, custom: Record) -> Result<(), OverwatchError> {
        self.write(custom).await?;
        info!(target: "rapd.overwatch", id = %self.uuid, ow_type = %self.cfg.ow_type, "registered");
        Ok(())
    }

    /// Refresh the entry and restart its expiry.
    pub async fn update(&self, custom: Record) -> Result<(), OverwatchError> {
        self.write(custom).await?;
        debug!(target: "rapd.overwatch", id = %self.uuid, "updated");
        Ok(())
    }

    /// Every live process entry. Mirror entries and launcher markers are left out.
    pub async fn discover(&self) -> Result<Vec<ServiceEntry>, OverwatchError> {
        let records = self.store.records(OVERWATCH_PREFIX).await?;
        let entries = records
            .into_iter()
            .filter_map(|(key, fields)| {
                let id = fields.get("id")?.as_str()?.to_string();
                if key.strip_prefix(OVERWATCH_PREFIX) != Some(id.as_str()) {
                    return None;
                }
                Some(ServiceEntry {
                    ow_type: fields.get("ow_type")?.as_str()?.to_string(),
                    ow_id: fields.get("ow_id").and_then(Value::as_str).map(str::to_string),
                    timestamp: fields.get("timestamp").and_then(Value::as_f64).unwrap_or(0.0),
                    id,
                    fields,
                })
            })
            .collect();
        Ok(entries)
    }

    async fn write(&self, custom: Record) -> Result<(), OverwatchError> {
        let ttl = self.cfg.ttl;
        let entry = self.entry(custom);

        self.store.put_record(&self.key(), entry.clone(), ttl).await?;

        if let Some(ow_id) = &self.cfg.ow_id {
            let mirror = format!("{}:{ow_id}", self.key());
            self.store.put_record(&mirror, entry.clone(), ttl).await?;
        }

        if let Some(list) = entry.get(JOB_LIST_FIELD).and_then(Value::as_str) {
            let mut marker = Record::new();
            marker.insert("running".to_string(), json!(1));
            self.store
                .put_record(&format!("{OVERWATCH_PREFIX}{list}"), marker, ttl)
                .await?;
        }
        Ok(())
    }

    fn entry(&self, custom: Record) -> Record {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let mut entry = Record::new();
        entry.insert("ow_type".into(), json!(self.cfg.ow_type));
        entry.insert("id".into(), json!(self.uuid));
        entry.insert("ow_id".into(), json!(self.cfg.ow_id));
        entry.insert("timestamp".into(), json!(timestamp));
        let host = host_info();
        entry.insert("hostname".into(), json!(host.hostname));
        entry.insert("platform".into(), json!(host.platform));
        entry.insert("arch".into(), json!(host.arch));
        entry.insert("uptime_seconds".into(), json!(uptime().as_secs()));
        entry.extend(custom);
        entry
    }
}

impl std::fmt::Debug for Registrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar")
            .field("uuid", &self.uuid)
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rapd_core::{MemoryStore, StoreError};

    use super::*;

    fn custom(pairs: &[(&str, Value)]) -> Record {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn registered_process_is_discovered() {
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
        let registrar = Registrar::new(store.clone(), OverwatchConfig::new("launcher"));
        registrar
            .register(custom(&[("site", json!("NECAT_E"))]))
            .await
            .unwrap();

        let found = registrar.discover().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, registrar.id());
        assert_eq!(found[0].ow_type, "launcher");
        assert_eq!(found[0].ow_id, None);
        assert!(found[0].timestamp > 0.0);
        assert_eq!(found[0].fields["site"], json!("NECAT_E"));
        assert_eq!(found[0].fields["hostname"], json!(host_info().hostname));
    }

    #[tokio::test]
    async fn mirror_and_launcher_marker_are_written() {
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
        let registrar = Registrar::new(store.clone(), OverwatchConfig::new("launcher").with_ow_id("watcher1"));
        registrar
            .register(custom(&[(JOB_LIST_FIELD, json!("RAPD_JOBS_NECAT"))]))
            .await
            .unwrap();

        let mirror = format!("OW:{}:watcher1", registrar.id());
        assert!(store.record(&mirror).await.unwrap().is_some());
        assert_eq!(
            store.record("OW:RAPD_JOBS_NECAT").await.unwrap().unwrap()["running"],
            json!(1)
        );

        // Only the primary entry counts as a service.
        let found = registrar.discover().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].ow_id.as_deref(), Some("watcher1"));
    }

    #[tokio::test(start_paused = true)]
    async fn entry_lapses_without_updates() {
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
        let registrar = Registrar::new(store, OverwatchConfig::new("control"));
        registrar.register(Record::new()).await.unwrap();

        tokio::time::advance(Duration::from_secs(20)).await;
        registrar.update(Record::new()).await.unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(registrar.discover().await.unwrap().len(), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(registrar.discover().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_outage_is_reported_not_retried() {
        let memory = Arc::new(MemoryStore::new());
        memory.set_available(false);
        let registrar = Registrar::new(memory.clone(), OverwatchConfig::new("monitor"));

        let err = registrar.register(Record::new()).await.unwrap_err();
        assert!(matches!(err, OverwatchError::Store(StoreError::Unavailable(_))));

        memory.set_available(true);
        assert!(registrar.discover().await.unwrap().is_empty());
    }
}
