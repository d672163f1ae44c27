//! Picks the plugins eligible to answer a parsed query.

use crate::plugin::{PluginInstance, PluginRegistry};
use kestrel_types::{Os, Query};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct Router {
    os: Option<Os>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(crate::platform::detect())
    }
}

impl Router {
    /// `os` is the platform plugins must declare support for; `None`
    /// matches no plugin.
    #[must_use]
    pub fn new(os: Option<Os>) -> Self {
        Self { os }
    }

    #[must_use]
    pub fn os(&self) -> Option<Os> {
        self.os
    }

    /// Eligible plugins, unique by id, in registration order.
    ///
    /// Keyword queries go to the keyword's plugins, global queries to
    /// global plugins. Disabled plugins and plugins that do not support the
    /// current OS are dropped. An empty list is a valid answer.
    #[must_use]
    pub fn route(&self, query: &Query, registry: &PluginRegistry) -> Vec<Arc<PluginInstance>> {
        let candidates = if query.is_global() {
            registry.global_plugins()
        } else {
            registry.plugins_for_keyword(query.trigger_keyword())
        };

        let mut seen = HashSet::new();
        let eligible: Vec<_> = candidates
            .into_iter()
            .filter(|p| self.is_eligible(p))
            .filter(|p| seen.insert(p.id().to_string()))
            .collect();

        debug!(
            "Routed {:?} to [{}]",
            query.raw_query(),
            eligible
                .iter()
                .map(|p| p.id())
                .collect::<Vec<_>>()
                .join(", ")
        );
        eligible
    }

    fn is_eligible(&self, plugin: &PluginInstance) -> bool {
        if plugin.is_disabled() {
            debug!("[{}] Skipped: disabled", plugin.id());
            return false;
        }
        match self.os {
            Some(os) if plugin.metadata().supports_os(os) => true,
            _ => {
                debug!("[{}] Skipped: unsupported on {:?}", plugin.id(), self.os);
                false
            }
        }
    }
}
