use std::time::Duration;

use crate::OverwatchError;

/// Key prefix of every overwatch entry.
pub const OVERWATCH_PREFIX: &str = "OW:";

/// An entry not refreshed within this window is considered dead.
pub const OVERWATCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct OverwatchConfig {
    /// Kind of process, e.g. `"launcher"` or `"control"`.
    pub ow_type: String,
    /// Id of the overwatcher that started this process, if any.
    pub ow_id: Option<String>,
    pub ttl: Duration,
    /// Heartbeat period; must stay well below `ttl`.
    pub interval: Duration,
}

impl Default for OverwatchConfig {
    fn default() -> Self {
        Self {
            ow_type: "unknown".to_string(),
            ow_id: None,
            ttl: OVERWATCH_TIMEOUT,
            interval: Duration::from_secs(5),
        }
    }
}

impl OverwatchConfig {
    pub fn new(ow_type: impl Into<String>) -> Self {
        Self {
            ow_type: ow_type.into(),
            ..Self::default()
        }
    }

    pub fn with_ow_id(mut self, ow_id: impl Into<String>) -> Self {
        self.ow_id = Some(ow_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), OverwatchError> {
        if self.interval.is_zero() {
            return Err(OverwatchError::Config("heartbeat interval is zero".into()));
        }
        if self.interval >= self.ttl {
            return Err(OverwatchError::Config(format!(
                "heartbeat interval {:?} does not beat ttl {:?}",
                self.interval, self.ttl
            )));
        }
        Ok(())
    }
}
