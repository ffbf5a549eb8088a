pub mod adapter;
pub use adapter::{
    AdapterError, AdapterFactory, AdapterRegistry, EchoRecord, LaunchAdapter, LaunchOutcome,
    LaunchRequest,
};

pub mod error;
pub use error::CoreError;

pub mod persist;
pub use persist::{COMMAND_SUFFIX, PersistError, write_command_file, write_command_script};

pub mod store;
pub use store::{MemoryStore, Record, SharedStore, StoreError};
#[cfg(feature = "redis")]
pub use store::RedisStore;

pub mod system;
pub use system::{HostInfo, host_info, mark_started, uptime};

pub mod wire;
pub use wire::{END_MARKER, FrameDecoder, START_MARKER, WireError};
