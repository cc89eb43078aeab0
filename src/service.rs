//! # Service Registry
//!
//! Maps service names to checker plugins. Populated lazily by `INIT` jobs,
//! grows for the life of the worker process, and is only ever touched by the
//! single dispatch thread.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// Prefix selecting the batch entry point of a service.
pub const BATCH_PREFIX: &str = "batch_";

/// A compiled-in checker service.
///
/// The single-job entry point takes the job token (usually a filename) and
/// the remaining call arguments, `args[0]` being the source text to check.
/// Job-level failures are encoded into the returned value, never raised.
pub trait CheckerPlugin: Send + Sync {
    fn service_name(&self) -> &'static str;
    fn check(&self, filename: &str, args: &[Value]) -> Value;
    fn supports_batch(&self) -> bool {
        true
    }
}

#[derive(Default)]
pub struct ServiceRegistry {
    single: HashMap<String, Arc<dyn CheckerPlugin>>,
    batch: HashMap<String, Arc<dyn CheckerPlugin>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under its declared service name, and under the
    /// `batch_` variant when it supports batch execution.
    pub fn register(&mut self, plugin: Arc<dyn CheckerPlugin>) {
        let name = plugin.service_name().to_string();
        if plugin.supports_batch() {
            self.batch
                .insert(format!("{BATCH_PREFIX}{name}"), Arc::clone(&plugin));
        }
        self.single.insert(name, plugin);
    }

    pub fn single(&self, service: &str) -> Option<&Arc<dyn CheckerPlugin>> {
        self.single.get(service)
    }

    /// Look up a batch entry by its full `batch_`-prefixed service id.
    pub fn batch(&self, service: &str) -> Option<&Arc<dyn CheckerPlugin>> {
        self.batch.get(service)
    }

    pub fn is_empty(&self) -> bool {
        self.single.is_empty()
    }
}
