use super::Plugin;
use crate::config::PluginSettings;
use crate::query::KeywordTable;
use crate::{Error, Result};
use kestrel_types::{GLOBAL_TRIGGER_KEYWORD, PluginMetadata};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// A registered plugin: metadata with user overrides applied, plus its handle.
///
/// Instances are immutable; re-registering or changing settings swaps in a
/// new instance that keeps the original registration order.
pub struct PluginInstance {
    metadata: PluginMetadata,
    declared_keywords: Vec<String>,
    settings: PluginSettings,
    registration_order: u64,
    plugin: Arc<dyn Plugin>,
}

impl PluginInstance {
    fn new(
        metadata: PluginMetadata,
        settings: PluginSettings,
        registration_order: u64,
        plugin: Arc<dyn Plugin>,
    ) -> Self {
        let declared_keywords = metadata.trigger_keywords.clone();
        let mut instance = Self {
            metadata,
            declared_keywords,
            settings: PluginSettings::default(),
            registration_order,
            plugin,
        };
        instance.apply(settings);
        instance
    }

    fn apply(&mut self, settings: PluginSettings) {
        self.metadata.trigger_keywords = if settings.trigger_keywords.is_empty() {
            self.declared_keywords.clone()
        } else {
            settings.trigger_keywords.clone()
        };
        self.settings = settings;
    }

    fn with_settings(&self, settings: PluginSettings) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.trigger_keywords = self.declared_keywords.clone();
        Self::new(
            metadata,
            settings,
            self.registration_order,
            Arc::clone(&self.plugin),
        )
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// Metadata with trigger-keyword overrides applied
    #[must_use]
    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn settings(&self) -> &PluginSettings {
        &self.settings
    }

    #[must_use]
    pub fn priority(&self) -> i32 {
        self.settings.priority
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.settings.disabled
    }

    /// Position in registration order, stable across re-registration
    #[must_use]
    pub fn registration_order(&self) -> u64 {
        self.registration_order
    }

    #[must_use]
    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    fn has_keyword(&self, keyword: &str, case_sensitive: bool) -> bool {
        self.metadata.trigger_keywords.iter().any(|k| {
            if case_sensitive {
                k == keyword
            } else {
                k.to_lowercase() == keyword.to_lowercase()
            }
        })
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("id", &self.metadata.id)
            .field("trigger_keywords", &self.metadata.trigger_keywords)
            .field("settings", &self.settings)
            .field("registration_order", &self.registration_order)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Inner {
    /// Registration order
    plugins: Vec<Arc<PluginInstance>>,
    settings: HashMap<String, PluginSettings>,
    next_order: u64,
}

/// Thread-safe plugin registry.
///
/// Readers get cheap `Arc` snapshots and never observe a half-applied
/// registration.
pub struct PluginRegistry {
    inner: RwLock<Inner>,
    case_sensitive: bool,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new(true)
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.read().plugins.len())
            .field("case_sensitive", &self.case_sensitive)
            .finish()
    }
}

impl PluginRegistry {
    /// `case_sensitive` governs trigger keyword lookups.
    #[must_use]
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            case_sensitive,
        }
    }

    // A poisoned lock only means a writer panicked mid-call; every write
    // below is a single push/replace so the data is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register or replace a plugin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the metadata id is empty.
    pub fn register(
        &self,
        metadata: PluginMetadata,
        plugin: Arc<dyn Plugin>,
    ) -> Result<Arc<PluginInstance>> {
        if metadata.id.is_empty() {
            return Err(Error::InvalidArgument(
                "plugin id must not be empty".to_string(),
            ));
        }

        let mut inner = self.write();
        let settings = inner.settings.get(&metadata.id).cloned().unwrap_or_default();

        if let Some(slot) = inner.plugins.iter_mut().find(|p| p.id() == metadata.id) {
            let instance = Arc::new(PluginInstance::new(
                metadata,
                settings,
                slot.registration_order,
                plugin,
            ));
            debug!("[{}] Re-registered plugin", instance.id());
            *slot = Arc::clone(&instance);
            return Ok(instance);
        }

        let order = inner.next_order;
        inner.next_order += 1;
        let instance = Arc::new(PluginInstance::new(metadata, settings, order, plugin));
        info!(
            "[{}] Registered plugin (keywords: {:?})",
            instance.id(),
            instance.metadata().trigger_keywords
        );
        inner.plugins.push(Arc::clone(&instance));
        Ok(instance)
    }

    /// Remove a plugin, returning it if it was registered.
    pub fn unregister(&self, id: &str) -> Option<Arc<PluginInstance>> {
        let mut inner = self.write();
        let pos = inner.plugins.iter().position(|p| p.id() == id)?;
        info!("[{id}] Unregistered plugin");
        Some(inner.plugins.remove(pos))
    }

    /// Store user settings for `id`, applying them now if it is registered
    /// and on any later registration otherwise.
    pub fn apply_settings(&self, id: &str, settings: PluginSettings) {
        let mut inner = self.write();
        if let Some(slot) = inner.plugins.iter_mut().find(|p| p.id() == id) {
            *slot = Arc::new(slot.with_settings(settings.clone()));
            debug!("[{id}] Applied settings {:?}", settings);
        }
        inner.settings.insert(id.to_string(), settings);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<PluginInstance>> {
        self.read().plugins.iter().find(|p| p.id() == id).cloned()
    }

    #[must_use]
    pub fn all_plugins(&self) -> Vec<Arc<PluginInstance>> {
        self.read().plugins.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().plugins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().plugins.is_empty()
    }

    /// Plugins whose trigger keywords include `"*"`
    #[must_use]
    pub fn global_plugins(&self) -> Vec<Arc<PluginInstance>> {
        self.read()
            .plugins
            .iter()
            .filter(|p| p.metadata().is_global())
            .cloned()
            .collect()
    }

    /// Plugins registered under exactly `keyword`; `"*"` matches nothing here.
    #[must_use]
    pub fn plugins_for_keyword(&self, keyword: &str) -> Vec<Arc<PluginInstance>> {
        if keyword.is_empty() || keyword == GLOBAL_TRIGGER_KEYWORD {
            return Vec::new();
        }
        self.read()
            .plugins
            .iter()
            .filter(|p| p.has_keyword(keyword, self.case_sensitive))
            .cloned()
            .collect()
    }

    /// Keywords and commands of every enabled plugin, for the parser
    #[must_use]
    pub fn keyword_table(&self) -> KeywordTable {
        let mut table = KeywordTable::new(self.case_sensitive);
        for plugin in self.read().plugins.iter().filter(|p| !p.is_disabled()) {
            let commands: Vec<&str> = plugin
                .metadata()
                .commands
                .iter()
                .map(|c| c.command.as_str())
                .collect();
            for keyword in &plugin.metadata().trigger_keywords {
                table.insert(keyword, &commands);
            }
        }
        table
    }
}
