//! Shared data types of the dispatch core.
//!
//! Everything that crosses a process boundary lives here: the [`JobCommand`] carried on the wire,
//! the `(host, port)` [`Address`] pairs used for launch targets and return addresses, the
//! read-only [`SiteSettings`] a launcher is started with, and the [`MonitorEvent`]s that
//! monitors inject into the control process.

mod address;
pub use address::{Address, LaunchTarget, ReturnAddress};

mod command;
pub use command::{Directories, JOB_COMMAND_ARITY, JobCommand};

mod settings;
pub use settings::{ControlSettings, LauncherSettings, QueueClass, QueueRule, QueueSettings, SiteSettings};

mod event;
pub use event::MonitorEvent;

mod error;
pub use error::ModelError;

/// Job type that launchers answer with an echo instead of a real launch.
pub const ECHO_JOB: &str = "ECHO";
