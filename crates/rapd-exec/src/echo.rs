use async_trait::async_trait;
use rapd_core::{AdapterError, EchoRecord, LaunchAdapter, LaunchOutcome, LaunchRequest};
use rapd_net::{LaunchAction, RetryPolicy};
use tracing::{debug, info};

/// Status a finished job reports in `process.status`.
pub const STATUS_DONE: i64 = 100;

/// Answers a job in-process: nothing is launched and nothing is written to disk.
///
/// The job is marked done and, when the site enables `echo_reply`, sent back to its return
/// address. Useful for checking the path from a control process to a launcher and back.
pub struct EchoAdapter {
    req: LaunchRequest,
    retry: RetryPolicy,
}

impl EchoAdapter {
    pub fn new(req: LaunchRequest) -> Self {
        Self {
            req,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl LaunchAdapter for EchoAdapter {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn run(self: Box<Self>) -> Result<LaunchOutcome, AdapterError> {
        let mut command = self.req.command()?;
        let settings = self.req.settings();
        debug!(target: "rapd.exec.echo", site = %self.req.site.id, ?command, "echo");

        command.set_process_status(STATUS_DONE);

        let replied = if settings.echo_reply {
            let sent = LaunchAction::new(command.return_address.clone(), &command)
                .map(|action| action.with_policy(self.retry))
                .map_err(|e| AdapterError::Reply(e.to_string()))?
                .send()
                .await
                .map_err(|e| AdapterError::Reply(e.to_string()))?;
            debug!(target: "rapd.exec.echo", to = %command.return_address, bytes = sent, "echo returned");
            true
        } else {
            false
        };

        info!(target: "rapd.exec.echo", job = %command.command, replied, "echoed");
        Ok(LaunchOutcome::Echoed(EchoRecord {
            site_id: self.req.site.id.clone(),
            command,
            settings: settings.clone(),
            replied,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rapd_model::{ModelError, SiteSettings};
    use rapd_net::{ControlServer, Received, ServerConfig};
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn site(echo_reply: bool) -> Arc<SiteSettings> {
        let mut site = SiteSettings::new("NECAT_E");
        site.launcher.adapter = "echo".into();
        site.launcher.echo_reply = echo_reply;
        Arc::new(site)
    }

    #[tokio::test]
    async fn records_site_command_and_settings() {
        let message = json!({"type": "ECHO", "data": {"x": 1}, "return_address": ["127.0.0.1", 50010]});
        let site = site(false);
        let outcome = Box::new(EchoAdapter::new(LaunchRequest::new(site.clone(), message)))
            .run()
            .await
            .unwrap();

        let LaunchOutcome::Echoed(record) = outcome else {
            panic!("echo adapter must echo");
        };
        assert_eq!(record.site_id, "NECAT_E");
        assert_eq!(record.settings, site.launcher);
        assert_eq!(record.command.data, json!({"x": 1}));
        assert_eq!(record.command.extra["process"]["status"], json!(STATUS_DONE));
        assert!(!record.replied);
    }

    #[tokio::test]
    async fn two_tuple_is_an_unpack_error() {
        let req = LaunchRequest::new(site(false), json!(["ECHO", {}]));
        let err = Box::new(EchoAdapter::new(req)).run().await.unwrap_err();
        assert!(matches!(err, AdapterError::Unpack(ModelError::Arity { expected: 5, found: 2 })));
    }

    #[tokio::test]
    async fn reply_reaches_the_return_address() {
        let (tx, mut rx) = mpsc::channel::<Received>(1);
        let server = ControlServer::bind("127.0.0.1:0", ServerConfig::default()).await.unwrap();
        let port = server.local_addr().unwrap().port();
        let handle = server.spawn(Arc::new(tx), CancellationToken::new()).unwrap();

        let message = json!({
            "command": "ECHO",
            "process": {"process_id": "p1"},
            "return_address": ["127.0.0.1", port]
        });
        let outcome = Box::new(EchoAdapter::new(LaunchRequest::new(site(true), message)))
            .run()
            .await
            .unwrap();
        assert!(matches!(outcome, LaunchOutcome::Echoed(EchoRecord { replied: true, .. })));

        let got = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(got.message["process"], json!({"process_id": "p1", "status": 100}));
        assert_eq!(got.message["return_address"], json!(["127.0.0.1", port]));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_return_address_fails_the_reply() {
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let message = json!({"command": "ECHO", "return_address": ["127.0.0.1", port]});
        let adapter = EchoAdapter::new(LaunchRequest::new(site(true), message))
            .with_retry(RetryPolicy::new(2, Duration::from_millis(5)));
        let err = Box::new(adapter).run().await.unwrap_err();
        assert!(matches!(err, AdapterError::Reply(_)));
    }
}
