use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use rapd_core::{
    AdapterError, AdapterFactory, AdapterRegistry, CoreError, LaunchOutcome, LaunchRequest,
};
use rapd_model::SiteSettings;
use rapd_net::CommandReceiver;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Receives jobs and hands each one to a fresh adapter on its own task.
///
/// The adapter factory is looked up once, when the launcher is built.
#[derive(Clone)]
pub struct Launcher {
    site: Arc<SiteSettings>,
    factory: AdapterFactory,
}

impl Launcher {
    pub fn new(site: Arc<SiteSettings>, registry: &AdapterRegistry) -> Result<Self, CoreError> {
        let factory = registry.resolve(&site.launcher.adapter)?;
        info!(target: "rapd.exec.launcher", site = %site.id, adapter = %site.launcher.adapter, "adapter selected");
        Ok(Self { site, factory })
    }

    pub fn site(&self) -> &SiteSettings {
        &self.site
    }

    /// Launch one job without waiting for it.
    pub fn launch(
        &self,
        message: Value,
        peer: Option<SocketAddr>,
    ) -> JoinHandle<Result<LaunchOutcome, AdapterError>> {
        let mut req = LaunchRequest::new(self.site.clone(), message);
        if let Some(peer) = peer {
            req = req.with_peer(peer);
        }
        let adapter = (self.factory)(req);

        tokio::spawn(async move {
            let name = adapter.name();
            let res = adapter.run().await;
            match &res {
                Ok(outcome) => info!(target: "rapd.exec.launcher", adapter = name, ?peer, ?outcome, "job handed off"),
                Err(e @ AdapterError::Unpack(_)) => {
                    error!(target: "rapd.exec.launcher", adapter = name, ?peer, error = %e, "job rejected")
                }
                Err(e) => warn!(target: "rapd.exec.launcher", adapter = name, ?peer, error = %e, "launch failed"),
            }
            res
        })
    }
}

#[async_trait]
impl CommandReceiver for Launcher {
    async fn receive(&self, message: Value, peer: SocketAddr) {
        self.launch(message, Some(peer));
    }
}
