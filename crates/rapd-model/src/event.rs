use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Notification a monitor hands to the control process.
///
/// Serialized with a `message_type` tag so it can travel the same wire as job commands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type")]
pub enum MonitorEvent {
    /// A detector wrote a new image.
    #[serde(rename = "NEWIMAGE")]
    NewImage { fullname: String, site_tag: String },
    /// The beamline announced a new data collection run.
    #[serde(rename = "NEWRUN")]
    NewRun { run_data: Value, site_tag: String },
}

impl MonitorEvent {
    pub fn message_type(&self) -> &'static str {
        match self {
            MonitorEvent::NewImage { .. } => "NEWIMAGE",
            MonitorEvent::NewRun { .. } => "NEWRUN",
        }
    }

    pub fn site_tag(&self) -> &str {
        match self {
            MonitorEvent::NewImage { site_tag, .. } | MonitorEvent::NewRun { site_tag, .. } => {
                site_tag
            }
        }
    }
}
