//! Background services that hang off the shared store: overwatch heartbeats and monitors.

use std::sync::Arc;

use anyhow::Context;
use rapd_core::{Record, RedisStore, SharedStore};
use rapd_monitor::{Monitor, MonitorConfig, MonitorError, MonitorKind, MonitorStats, Notifier};
use rapd_overwatch::{OverwatchConfig, Registrar, heartbeat};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Connect to the store at `url`, if one is configured.
pub async fn open_store(url: Option<&str>) -> anyhow::Result<Option<Arc<dyn SharedStore>>> {
    let Some(url) = url.filter(|u| !u.trim().is_empty()) else {
        return Ok(None);
    };
    let store = RedisStore::connect(url)
        .await
        .context("cannot reach the shared store")?;
    Ok(Some(Arc::new(store)))
}

/// The store, or an error naming the option that needs it.
pub fn require_store(store: Option<&Arc<dyn SharedStore>>, wanted_by: &str) -> anyhow::Result<Arc<dyn SharedStore>> {
    store
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("{wanted_by} needs a shared store (--store or the site's store_url)"))
}

/// A running overwatch entry for this process.
pub struct Overwatch {
    pub registrar: Arc<Registrar>,
    pub task: JoinHandle<()>,
}

/// Register as `ow_type` and keep the entry fresh until `token` is cancelled.
///
/// The entry carries `site_id`, so a coordinator can tell which site a process serves.
pub fn start_overwatch(
    store: Arc<dyn SharedStore>,
    ow_type: &str,
    ow_id: &str,
    site_id: &str,
    token: CancellationToken,
) -> anyhow::Result<Overwatch> {
    let cfg = OverwatchConfig::new(ow_type).with_ow_id(ow_id);
    cfg.validate()?;
    let registrar = Arc::new(Registrar::new(store, cfg));

    let mut custom = Record::new();
    custom.insert("site_id".to_string(), json!(site_id));
    let task = heartbeat(registrar.clone(), custom, token);
    info!(target: "rapd", ow_type, id = %registrar.id(), %ow_id, "overwatch started");
    Ok(Overwatch { registrar, task })
}

/// What to watch and how.
#[derive(Debug, Clone, Default)]
pub struct MonitorPlan {
    pub image_tags: Vec<String>,
    pub run_tags: Vec<String>,
    pub clean_start: bool,
    /// Overwatch id the monitors report under; `None` leaves them unregistered.
    pub ow_id: Option<String>,
}

impl MonitorPlan {
    pub fn is_empty(&self) -> bool {
        self.image_tags.is_empty() && self.run_tags.is_empty()
    }

    fn configs(&self) -> Vec<MonitorConfig> {
        [(MonitorKind::Image, &self.image_tags), (MonitorKind::Run, &self.run_tags)]
            .into_iter()
            .filter(|(_, tags)| !tags.is_empty())
            .map(|(kind, tags)| MonitorConfig::new(kind, tags).with_clean_start(self.clean_start))
            .collect()
    }
}

pub type MonitorTask = JoinHandle<Result<MonitorStats, MonitorError>>;

/// Start one monitor per kind in `plan`, all delivering to `notifier`.
pub fn start_monitors(
    store: Arc<dyn SharedStore>,
    plan: &MonitorPlan,
    notifier: Arc<dyn Notifier>,
    token: CancellationToken,
) -> Result<Vec<MonitorTask>, MonitorError> {
    let mut tasks = Vec::new();
    for cfg in plan.configs() {
        let kind = cfg.kind;
        let mut monitor = Monitor::new(cfg, store.clone(), notifier.clone())?;
        if let Some(ow_id) = &plan.ow_id {
            let ow = OverwatchConfig::new(format!("{}_monitor", kind.as_str())).with_ow_id(ow_id);
            monitor = monitor.with_registrar(Arc::new(Registrar::new(store.clone(), ow)));
        }
        tasks.push(monitor.spawn(token.clone()));
    }
    Ok(tasks)
}

/// Wait for monitors after shutdown and log how they ended.
pub async fn join_monitors(tasks: Vec<MonitorTask>) {
    for task in tasks {
        match task.await {
            Ok(Ok(stats)) => info!(target: "rapd", events = stats.events, skipped = stats.skipped, "monitor finished"),
            Ok(Err(e)) => warn!(target: "rapd", error = %e, "monitor failed"),
            Err(e) => warn!(target: "rapd", error = %e, "monitor task aborted"),
        }
    }
}
