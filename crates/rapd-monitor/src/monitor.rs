use std::sync::Arc;

use rapd_core::{Record, SharedStore};
use rapd_model::MonitorEvent;
use rapd_overwatch::Registrar;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{MonitorConfig, MonitorError, MonitorKind, Notifier};

/// Counters reported when a monitor stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MonitorStats {
    pub rounds: u64,
    pub events: u64,
    /// Entries that could not be turned into an event.
    pub skipped: u64,
}

/// Polls the shared store for announcements and turns them into [`MonitorEvent`]s.
///
/// Each round pops at most one entry per tag and rests `poll_interval` after every pop. Any
/// number of monitors may watch the same lists: the store's pop is atomic, so each entry is
/// delivered by exactly one of them.
pub struct Monitor {
    cfg: MonitorConfig,
    store: Arc<dyn SharedStore>,
    notifier: Arc<dyn Notifier>,
    registrar: Option<Arc<Registrar>>,
}

impl Monitor {
    pub fn new(
        cfg: MonitorConfig,
        store: Arc<dyn SharedStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, MonitorError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            store,
            notifier,
            registrar: None,
        })
    }

    /// Report liveness through `registrar` every `update_every` rounds.
    pub fn with_registrar(mut self, registrar: Arc<Registrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    pub fn spawn(self, token: CancellationToken) -> JoinHandle<Result<MonitorStats, MonitorError>> {
        tokio::spawn(self.run(token))
    }

    /// Poll until `token` is cancelled or the notifier goes away.
    pub async fn run(self, token: CancellationToken) -> Result<MonitorStats, MonitorError> {
        let kind = self.cfg.kind.as_str();
        let lists: Vec<(String, String)> = self
            .cfg
            .tags
            .iter()
            .map(|tag| (self.cfg.kind.list_key(tag), tag.clone()))
            .collect();

        if self.cfg.clean_start {
            for (list, _) in &lists {
                self.store.delete(list).await?;
            }
            debug!(target: "rapd.monitor", kind, "queued entries dropped");
        }

        if let Some(registrar) = &self.registrar
            && let Err(e) = registrar.register(Record::new()).await
        {
            warn!(target: "rapd.monitor", kind, error = %e, "overwatch register failed");
        }

        info!(target: "rapd.monitor", kind, tags = ?self.cfg.tags, "monitoring");
        let mut stats = MonitorStats::default();
        let update_every = u64::from(self.cfg.update_every.max(1));

        'outer: loop {
            for (list, tag) in &lists {
                if token.is_cancelled() {
                    break 'outer;
                }
                match self.store.pop_oldest(list).await {
                    Ok(Some(raw)) => match self.event(tag, raw) {
                        Some(event) => {
                            trace!(target: "rapd.monitor", kind, %tag, "event");
                            self.notifier.notify(event).await?;
                            stats.events += 1;
                        }
                        None => stats.skipped += 1,
                    },
                    Ok(None) => {}
                    Err(e) => warn!(target: "rapd.monitor", kind, %list, error = %e, "poll failed"),
                }

                tokio::select! {
                    _ = token.cancelled() => break 'outer,
                    _ = tokio::time::sleep(self.cfg.poll_interval) => {}
                }
            }

            stats.rounds += 1;
            if stats.rounds % update_every == 0
                && let Some(registrar) = &self.registrar
                && let Err(e) = registrar.update(Record::new()).await
            {
                warn!(target: "rapd.monitor", kind, error = %e, "overwatch update failed");
            }
        }

        info!(target: "rapd.monitor", kind, events = stats.events, skipped = stats.skipped, "stopped");
        Ok(stats)
    }

    fn event(&self, tag: &str, raw: String) -> Option<MonitorEvent> {
        let site_tag = tag.to_string();
        match self.cfg.kind {
            MonitorKind::Image => Some(MonitorEvent::NewImage {
                fullname: raw,
                site_tag,
            }),
            MonitorKind::Run => match serde_json::from_str::<Value>(&raw) {
                Ok(run_data) => Some(MonitorEvent::NewRun { run_data, site_tag }),
                Err(e) => {
                    warn!(target: "rapd.monitor", %tag, error = %e, "run entry is not JSON; skipped");
                    None
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use rapd_core::MemoryStore;
    use rapd_overwatch::OverwatchConfig;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;

    fn fast(cfg: MonitorConfig) -> MonitorConfig {
        cfg.with_poll_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn image_paths_become_new_image_events() {
        let store = Arc::new(MemoryStore::new());
        store.push("images_collected:NECAT_E", "/raw/B_1_001.cbf".into()).await.unwrap();
        store.push("images_collected:NECAT_E", "/raw/B_1_002.cbf".into()).await.unwrap();

        let (tx, mut rx) = mpsc::channel::<MonitorEvent>(8);
        let token = CancellationToken::new();
        let monitor = Monitor::new(fast(MonitorConfig::image(["necat_e"])), store, Arc::new(tx)).unwrap();
        let task = monitor.spawn(token.clone());

        for n in 1..=2 {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
            assert_eq!(
                event,
                MonitorEvent::NewImage {
                    fullname: format!("/raw/B_1_00{n}.cbf"),
                    site_tag: "NECAT_E".into()
                }
            );
        }

        token.cancel();
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.events, 2);
    }

    #[tokio::test]
    async fn two_monitors_never_share_an_entry() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..100 {
            store.push("images_collected:SITE", format!("/raw/img_{i:03}.cbf")).await.unwrap();
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<MonitorEvent>();
        let notifier: Arc<dyn Notifier> = Arc::new(tx);
        let token = CancellationToken::new();
        let tasks: Vec<_> = (0..2)
            .map(|_| {
                Monitor::new(fast(MonitorConfig::image(["SITE"])), store.clone(), notifier.clone())
                    .unwrap()
                    .spawn(token.clone())
            })
            .collect();

        let mut seen = HashSet::new();
        while seen.len() < 100 {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv()).await.unwrap().unwrap();
            let MonitorEvent::NewImage { fullname, .. } = event else {
                panic!("image monitor emitted a run event");
            };
            assert!(seen.insert(fullname), "entry delivered twice");
        }

        token.cancel();
        let mut total = 0;
        for task in tasks {
            total += task.await.unwrap().unwrap().events;
        }
        assert_eq!(total, 100);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn run_entries_are_parsed_and_bad_ones_skipped() {
        let store = Arc::new(MemoryStore::new());
        store.push("run_data:necat_e", "not json".into()).await.unwrap();
        store.push("run_data:necat_e", r#"{"run_number": 3, "frames": 360}"#.into()).await.unwrap();

        let (tx, mut rx) = mpsc::channel::<MonitorEvent>(8);
        let token = CancellationToken::new();
        let task = Monitor::new(fast(MonitorConfig::run(["NECAT_E"])), store, Arc::new(tx))
            .unwrap()
            .spawn(token.clone());

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.message_type(), "NEWRUN");
        assert_eq!(
            event,
            MonitorEvent::NewRun {
                run_data: json!({"run_number": 3, "frames": 360}),
                site_tag: "necat_e".into()
            }
        );

        token.cancel();
        let stats = task.await.unwrap().unwrap();
        assert_eq!((stats.events, stats.skipped), (1, 1));
    }

    #[tokio::test]
    async fn clean_start_drops_backlog() {
        let store = Arc::new(MemoryStore::new());
        store.push("images_collected:A", "/old.cbf".into()).await.unwrap();

        let (tx, mut rx) = mpsc::channel::<MonitorEvent>(8);
        let token = CancellationToken::new();
        let cfg = fast(MonitorConfig::image(["A"])).with_clean_start(true);
        let task = Monitor::new(cfg, store.clone(), Arc::new(tx)).unwrap().spawn(token.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.push("images_collected:A", "/new.cbf".into()).await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(event, MonitorEvent::NewImage { fullname, .. } if fullname == "/new.cbf"));

        token.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn closed_notifier_stops_the_monitor() {
        let store = Arc::new(MemoryStore::new());
        store.push("images_collected:A", "/x.cbf".into()).await.unwrap();
        let (tx, rx) = mpsc::channel::<MonitorEvent>(1);
        drop(rx);

        let res = Monitor::new(fast(MonitorConfig::image(["A"])), store, Arc::new(tx))
            .unwrap()
            .spawn(CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(res, Err(MonitorError::NotifierClosed)));
    }

    #[tokio::test]
    async fn registrar_is_kept_fresh() {
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
        let registrar = Arc::new(Registrar::new(store.clone(), OverwatchConfig::new("control")));
        let (tx, _rx) = mpsc::channel::<MonitorEvent>(1);
        let mut cfg = fast(MonitorConfig::image(["A"]));
        cfg.update_every = 2;

        let token = CancellationToken::new();
        let task = Monitor::new(cfg, store, Arc::new(tx))
            .unwrap()
            .with_registrar(registrar.clone())
            .spawn(token.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();
        let stats = task.await.unwrap().unwrap();
        assert!(stats.rounds >= 2);

        let found = registrar.discover().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].ow_type, "control");
    }
}
