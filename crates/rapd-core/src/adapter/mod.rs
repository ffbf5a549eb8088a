//! Launch adapters: the strategy that turns a received job into a running process.
//!
//! A launcher resolves one adapter factory at startup from its site settings. For each job it
//! builds a fresh adapter from a [`LaunchRequest`] and drives it on its own task, so a slow or
//! failing launch never holds up the receive loop.

mod registry;
pub use registry::{AdapterFactory, AdapterRegistry};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use rapd_model::{JobCommand, LauncherSettings, ModelError, SiteSettings};
use serde_json::Value;
use thiserror::Error;

use crate::persist::PersistError;

/// One received job together with the launcher context it arrived in.
#[derive(Clone, Debug)]
pub struct LaunchRequest {
    pub site: Arc<SiteSettings>,
    /// The decoded frame, not yet unpacked into a [`JobCommand`].
    pub message: Value,
    pub peer: Option<SocketAddr>,
}

impl LaunchRequest {
    pub fn new(site: Arc<SiteSettings>, message: Value) -> Self {
        Self {
            site,
            message,
            peer: None,
        }
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn settings(&self) -> &LauncherSettings {
        &self.site.launcher
    }

    /// Unpack the message. Adapters call this first so a malformed job fails before any side effect.
    pub fn command(&self) -> Result<JobCommand, AdapterError> {
        Ok(JobCommand::from_value(self.message.clone())?)
    }
}

/// What an adapter did with a job.
#[derive(Clone, Debug, PartialEq)]
pub enum LaunchOutcome {
    /// A detached local process was started on the command file.
    Started {
        command_file: PathBuf,
        pid: Option<u32>,
    },
    /// The job was accepted by the batch scheduler.
    Submitted {
        command_file: PathBuf,
        job_name: String,
        queue: String,
        nproc: u32,
    },
    /// The job was answered in-process without launching anything.
    Echoed(EchoRecord),
}

/// Echo adapter result: everything the job carried and the context it was received in.
#[derive(Clone, Debug, PartialEq)]
pub struct EchoRecord {
    pub site_id: String,
    pub command: JobCommand,
    pub settings: LauncherSettings,
    /// Whether the echoed job was sent back to its return address.
    pub replied: bool,
}

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("cannot unpack job: {0}")]
    Unpack(#[from] ModelError),

    #[error("cannot persist job: {0}")]
    Persist(#[from] PersistError),

    #[error("cannot encode job: {0}")]
    Encode(#[from] crate::wire::WireError),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} rejected the job ({})", status_text(*.code))]
    Submit { program: String, code: Option<i32> },

    #[error("reply failed: {0}")]
    Reply(String),
}

fn status_text(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Launch strategy for a single job.
#[async_trait]
pub trait LaunchAdapter: Send {
    fn name(&self) -> &'static str;

    /// Run the launch to the point where the job is handed off.
    ///
    /// Adapters never wait for the job itself to finish and never retry.
    async fn run(self: Box<Self>) -> Result<LaunchOutcome, AdapterError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_unpacks_lazily() {
        let site = Arc::new(SiteSettings::new("SITE"));
        let ok = LaunchRequest::new(site.clone(), json!({"command": "ECHO", "return_address": ["h", 1]}));
        assert_eq!(ok.command().unwrap().command, "ECHO");

        let bad = LaunchRequest::new(site, json!(["ECHO", {}]));
        assert!(matches!(bad.command(), Err(AdapterError::Unpack(ModelError::Arity { .. }))));
    }

    #[test]
    fn submit_error_names_the_status() {
        let err = AdapterError::Submit {
            program: "qsub".into(),
            code: Some(2),
        };
        assert_eq!(err.to_string(), "qsub rejected the job (exit code 2)");
        let err = AdapterError::Submit {
            program: "qsub".into(),
            code: None,
        };
        assert!(err.to_string().contains("terminated by signal"));
    }
}
