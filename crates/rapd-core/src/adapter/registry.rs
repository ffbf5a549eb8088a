use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::{
    adapter::{LaunchAdapter, LaunchRequest},
    error::CoreError,
};

/// Builds a fresh adapter for each job.
pub type AdapterFactory = Arc<dyn Fn(LaunchRequest) -> Box<dyn LaunchAdapter> + Send + Sync>;

/// Adapter factories keyed by the name used in site settings.
///
/// Keys are matched without regard to ASCII case.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    factories: BTreeMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `key`, replacing any earlier registration.
    pub fn register<F>(&mut self, key: &str, factory: F)
    where
        F: Fn(LaunchRequest) -> Box<dyn LaunchAdapter> + Send + Sync + 'static,
    {
        let key = key.to_ascii_lowercase();
        if self.factories.insert(key.clone(), Arc::new(factory)).is_some() {
            debug!(target: "rapd.core.registry", %key, "adapter replaced");
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(&key.to_ascii_lowercase())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn resolve(&self, key: &str) -> Result<AdapterFactory, CoreError> {
        self.factories
            .get(&key.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| CoreError::NoAdapter {
                key: key.to_string(),
                known: self.keys().collect::<Vec<_>>().join(", "),
            })
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.keys()).finish()
    }
}
