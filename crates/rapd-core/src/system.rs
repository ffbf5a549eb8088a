//! Identity of the machine and process, as reported in overwatch entries.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Where this process runs. Read once, then shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// `"localhost"` when the name cannot be read.
    pub hostname: String,
    pub platform: &'static str,
    pub arch: &'static str,
}

static HOST: OnceLock<HostInfo> = OnceLock::new();
static STARTED: OnceLock<Instant> = OnceLock::new();

pub fn host_info() -> &'static HostInfo {
    HOST.get_or_init(|| HostInfo {
        hostname: hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string()),
        platform: std::env::consts::OS,
        arch: std::env::consts::ARCH,
    })
}

/// Pin the uptime origin. Binaries call this first thing; otherwise the first
/// [`uptime`] call becomes the origin.
pub fn mark_started() {
    STARTED.get_or_init(Instant::now);
}

pub fn uptime() -> Duration {
    STARTED.get_or_init(Instant::now).elapsed()
}
