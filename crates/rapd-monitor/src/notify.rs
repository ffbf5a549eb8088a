use async_trait::async_trait;
use rapd_model::MonitorEvent;
use tokio::sync::mpsc;

use crate::MonitorError;

/// Where a monitor delivers its events.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Deliver one event. An error stops the monitor.
    async fn notify(&self, event: MonitorEvent) -> Result<(), MonitorError>;
}

#[async_trait]
impl Notifier for mpsc::Sender<MonitorEvent> {
    async fn notify(&self, event: MonitorEvent) -> Result<(), MonitorError> {
        self.send(event).await.map_err(|_| MonitorError::NotifierClosed)
    }
}

#[async_trait]
impl Notifier for mpsc::UnboundedSender<MonitorEvent> {
    async fn notify(&self, event: MonitorEvent) -> Result<(), MonitorError> {
        self.send(event).map_err(|_| MonitorError::NotifierClosed)
    }
}
