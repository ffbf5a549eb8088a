mod config;
pub use config::{OVERWATCH_PREFIX, OVERWATCH_TIMEOUT, OverwatchConfig};

mod errors;
pub use errors::OverwatchError;

pub mod registrar;
pub use registrar::{JOB_LIST_FIELD, Registrar, ServiceEntry};

pub mod tasks;
pub use tasks::heartbeat;
