use crate::Result;
use crate::fuzzy::{DEFAULT_THRESHOLD, FuzzyMatcher};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Per-invocation timeout
    #[serde(default = "default_plugin_timeout_ms")]
    pub plugin_timeout_ms: u64,

    #[serde(default = "default_keyword_case_sensitive")]
    pub keyword_case_sensitive: bool,

    /// Minimum fuzzy score for a default-scored result to count as a match
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: u64,

    /// Points added per recorded use of a result
    #[serde(default = "default_usage_boost_weight")]
    pub usage_boost_weight: u64,

    /// 0 keeps every result
    #[serde(default)]
    pub max_results: usize,

    /// Capacity of the per-query dispatch event channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default)]
    pub query_shortcuts: Vec<QueryShortcut>,

    /// Per-plugin overrides keyed by plugin id
    #[serde(default)]
    pub plugins: HashMap<String, PluginSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plugin_timeout_ms: default_plugin_timeout_ms(),
            keyword_case_sensitive: default_keyword_case_sensitive(),
            fuzzy_threshold: default_fuzzy_threshold(),
            usage_boost_weight: default_usage_boost_weight(),
            max_results: 0,
            channel_capacity: default_channel_capacity(),
            query_shortcuts: Vec::new(),
            plugins: HashMap::new(),
        }
    }
}

impl Config {
    /// Load config from file, falling back to defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        super::validation::warn_unknown_fields(&content, "config.json");
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save config to file.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    #[must_use]
    pub fn plugin_timeout(&self) -> Duration {
        Duration::from_millis(self.plugin_timeout_ms)
    }

    #[must_use]
    pub fn fuzzy_matcher(&self) -> FuzzyMatcher {
        FuzzyMatcher::new(self.fuzzy_threshold)
    }

    #[must_use]
    pub fn plugin_settings(&self, plugin_id: &str) -> Option<&PluginSettings> {
        self.plugins.get(plugin_id)
    }
}

/// A text prefix that expands into a longer query before parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryShortcut {
    pub shortcut: String,

    /// Expansion; may reference parameters as `{0}`, `{1}`, ...
    pub query: String,
}

impl QueryShortcut {
    pub fn new(shortcut: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            shortcut: shortcut.into(),
            query: query.into(),
        }
    }
}

/// User overrides for a single plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSettings {
    #[serde(default)]
    pub disabled: bool,

    /// Replaces the manifest's trigger keywords when non-empty
    #[serde(default)]
    pub trigger_keywords: Vec<String>,

    /// Higher wins ties on equal score
    #[serde(default)]
    pub priority: i32,
}

fn default_plugin_timeout_ms() -> u64 {
    3000
}
fn default_keyword_case_sensitive() -> bool {
    true
}
fn default_fuzzy_threshold() -> u64 {
    DEFAULT_THRESHOLD
}
fn default_usage_boost_weight() -> u64 {
    10
}
fn default_channel_capacity() -> usize {
    64
}
