mod util;
mod workdir;

pub mod echo;
pub use echo::EchoAdapter;

#[cfg(feature = "qsub")]
pub mod queue;
#[cfg(feature = "qsub")]
pub use queue::QueueAdapter;

#[cfg(feature = "shell")]
pub mod shell;
#[cfg(feature = "shell")]
pub use shell::ShellAdapter;

pub mod launcher;
pub use launcher::Launcher;

use rapd_core::AdapterRegistry;

/// Register every adapter compiled into this crate under its settings key.
pub fn register_default_adapters(registry: &mut AdapterRegistry) {
    registry.register("echo", |req| Box::new(EchoAdapter::new(req)));
    #[cfg(feature = "shell")]
    registry.register("shell", |req| Box::new(ShellAdapter::new(req)));
    #[cfg(feature = "qsub")]
    registry.register("qsub", |req| Box::new(QueueAdapter::new(req)));
}

pub fn default_registry() -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    register_default_adapters(&mut registry);
    registry
}
