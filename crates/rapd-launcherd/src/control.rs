use std::io::Write;
use std::net::SocketAddr;

use async_trait::async_trait;
use rapd_model::MonitorEvent;
use rapd_monitor::{MonitorError, Notifier};
use rapd_net::CommandReceiver;
use serde_json::Value;
use tracing::{info, warn};

/// Logs every message a control server decodes and every monitor event, optionally echoing
/// each to stdout.
#[derive(Debug, Default)]
pub struct ResultLog {
    print: bool,
}

impl ResultLog {
    pub fn new(print: bool) -> Self {
        Self { print }
    }

    fn summary(message: &Value) -> (&str, Option<&Value>) {
        let command = message.get("command").and_then(Value::as_str).unwrap_or("-");
        let status = message.get("process").and_then(|p| p.get("status"));
        (command, status)
    }

    fn echo(&self, line: impl std::fmt::Display) {
        if !self.print {
            return;
        }
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}") {
            warn!(target: "rapd.control", error = %e, "stdout write failed");
        }
    }
}

#[async_trait]
impl CommandReceiver for ResultLog {
    async fn receive(&self, message: Value, peer: SocketAddr) {
        let (command, status) = Self::summary(&message);
        info!(target: "rapd.control", %peer, command, status = ?status, "result received");
        self.echo(&message);
    }
}

#[async_trait]
impl Notifier for ResultLog {
    async fn notify(&self, event: MonitorEvent) -> Result<(), MonitorError> {
        info!(
            target: "rapd.control",
            message_type = event.message_type(),
            site_tag = event.site_tag(),
            "monitor event"
        );
        match serde_json::to_string(&event) {
            Ok(line) => self.echo(line),
            Err(e) => warn!(target: "rapd.control", error = %e, "event not serializable"),
        }
        Ok(())
    }
}
