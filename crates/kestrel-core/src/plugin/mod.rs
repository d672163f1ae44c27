//! Plugin interface and the registry of loaded plugins.

mod manifest;
mod process;
mod registry;

pub use manifest::{MANIFEST_FILENAME, Manifest, discover};
pub use process::ProcessPlugin;
pub use registry::{PluginInstance, PluginRegistry};

pub use crate::dispatch::BatchSink;

use crate::Result;
use futures_util::future::BoxFuture;
use kestrel_types::{Query, QueryResult};
use std::path::PathBuf;

/// Context handed to a plugin once, before it is registered
#[derive(Debug, Clone)]
pub struct PluginContext {
    pub plugin_id: String,

    /// Directory the plugin was loaded from, if it came from disk
    pub plugin_dir: Option<PathBuf>,
}

impl PluginContext {
    #[must_use]
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            plugin_dir: None,
        }
    }

    #[must_use]
    pub fn with_plugin_dir(mut self, dir: PathBuf) -> Self {
        self.plugin_dir = Some(dir);
        self
    }
}

/// A result source the launcher can query.
///
/// `query` may push intermediate batches through the sink; the returned
/// list is delivered as the final batch. Each call replaces everything the
/// plugin delivered earlier for the same query.
pub trait Plugin: Send + Sync {
    /// One-time setup before registration.
    ///
    /// # Errors
    ///
    /// An error keeps the plugin out of the registry.
    fn init(&self, _ctx: &PluginContext) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Answer one query.
    ///
    /// # Errors
    ///
    /// Errors are logged and count as zero results; they never fail the
    /// query as a whole.
    fn query<'a>(
        &'a self,
        query: &'a Query,
        sink: BatchSink,
    ) -> BoxFuture<'a, Result<Vec<QueryResult>>>;
}
