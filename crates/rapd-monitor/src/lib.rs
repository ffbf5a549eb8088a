mod config;
pub use config::{MonitorConfig, MonitorKind};

mod error;
pub use error::MonitorError;

pub mod monitor;
pub use monitor::{Monitor, MonitorStats};

pub mod notify;
pub use notify::Notifier;
