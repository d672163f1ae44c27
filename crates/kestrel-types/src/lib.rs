//! Shared types for Kestrel launcher components.
//!
//! This crate provides the value types used across kestrel-core and
//! kestrel-cli. All types are serializable so they can cross the stdio
//! plugin boundary as JSON.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Trigger keyword marking a plugin as global (queried without a keyword)
pub const GLOBAL_TRIGGER_KEYWORD: &str = "*";

/// Deserialize a Vec that may be null or missing (both become empty vec)
///
/// # Errors
///
/// Propagates errors from deserializing the list itself.
pub fn deserialize_null_as_empty_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt: Option<Vec<T>> = Option::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// Monotonic counter identifying one query submission.
///
/// Every plugin invocation and every result batch carries the epoch it was
/// issued under. Only batches of the current epoch reach the result list.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Epoch(u64);

impl Epoch {
    pub const ZERO: Epoch = Epoch(0);

    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A parsed user query.
///
/// Built by the query parser and never mutated afterwards. A query is either
/// global (empty trigger keyword) or scoped to one trigger keyword.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    raw_query: String,

    #[serde(default)]
    trigger_keyword: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<String>,

    #[serde(default)]
    search: String,
}

impl Query {
    /// A global query: no trigger keyword, the whole text is the search.
    #[must_use]
    pub fn global(raw_query: impl Into<String>, search: impl Into<String>) -> Self {
        Self {
            raw_query: raw_query.into(),
            trigger_keyword: String::new(),
            command: None,
            search: search.into(),
        }
    }

    /// A query scoped to `trigger_keyword`, optionally naming a command.
    #[must_use]
    pub fn keyword(
        raw_query: impl Into<String>,
        trigger_keyword: impl Into<String>,
        command: Option<String>,
        search: impl Into<String>,
    ) -> Self {
        Self {
            raw_query: raw_query.into(),
            trigger_keyword: trigger_keyword.into(),
            command: command.filter(|c| !c.is_empty()),
            search: search.into(),
        }
    }

    /// Text exactly as the user submitted it
    #[must_use]
    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    /// Trigger keyword, empty for global queries
    #[must_use]
    pub fn trigger_keyword(&self) -> &str {
        &self.trigger_keyword
    }

    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Free text used for matching, trimmed with single interior spaces
    #[must_use]
    pub fn search(&self) -> &str {
        &self.search
    }

    #[must_use]
    pub fn is_global(&self) -> bool {
        self.trigger_keyword.is_empty()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_query)
    }
}

/// Opaque icon descriptor, resolved by the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Icon {
    /// Icon theme or font glyph name
    Name(String),
    Emoji(String),
    /// Absolute or plugin-relative image path
    Path(PathBuf),
    Url(String),
    Base64(String),
}

/// One candidate returned by a plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// Unique id; the core assigns one when a plugin leaves it empty
    #[serde(default)]
    pub id: String,

    pub title: String,

    #[serde(default, alias = "subTitle")]
    pub subtitle: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Icon>,

    /// Relevance, higher is better. `None` lets the core score the title
    /// against the query search text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u64>,

    /// Provenance, always overwritten by the core
    #[serde(default)]
    pub plugin_id: String,

    /// Opaque action payload handed back to the plugin on execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_data: Option<String>,
}

impl QueryResult {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = subtitle.into();
        self
    }

    #[must_use]
    pub fn with_score(mut self, score: u64) -> Self {
        self.score = Some(score);
        self
    }

    #[must_use]
    pub fn with_icon(mut self, icon: Icon) -> Self {
        self.icon = Some(icon);
        self
    }

    #[must_use]
    pub fn with_action(mut self, action: serde_json::Value) -> Self {
        self.action = Some(action);
        self
    }

    /// Effective score, zero when unscored
    #[must_use]
    pub fn score_or_zero(&self) -> u64 {
        self.score.unwrap_or(0)
    }
}

/// Operating systems a plugin can declare support for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Os {
    Windows,
    Macos,
    Linux,
}

impl Os {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Os::Windows => "windows",
            Os::Macos => "macos",
            Os::Linux => "linux",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Os {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "windows" | "win" => Ok(Os::Windows),
            "macos" | "darwin" | "osx" => Ok(Os::Macos),
            "linux" => Ok(Os::Linux),
            other => Err(format!("unknown operating system '{other}'")),
        }
    }
}

impl TryFrom<String> for Os {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Os> for String {
    fn from(os: Os) -> Self {
        os.as_str().to_string()
    }
}

/// A sub-command a plugin recognizes after its trigger keyword
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataCommand {
    pub command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MetadataCommand {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: None,
        }
    }
}

/// Optional behaviours a plugin opts into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "camelCase")]
pub enum MetadataFeature {
    /// Delay invocation until typing pauses for `interval_ms`
    #[serde(rename_all = "camelCase")]
    Debounce { interval_ms: u64 },

    /// Opt out of the usage-count score boost
    IgnoreAutoScore,

    /// Features this version does not know about
    #[serde(other)]
    Unknown,
}

/// Static description of a plugin, fixed at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    pub id: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Icon>,

    /// Ordered trigger keywords; `"*"` marks the plugin as global
    #[serde(default, deserialize_with = "deserialize_null_as_empty_vec")]
    pub trigger_keywords: Vec<String>,

    #[serde(default, deserialize_with = "deserialize_null_as_empty_vec")]
    pub commands: Vec<MetadataCommand>,

    #[serde(default, rename = "supportedOS", alias = "supportedOs")]
    pub supported_os: BTreeSet<Os>,

    #[serde(default, deserialize_with = "deserialize_null_as_empty_vec")]
    pub features: Vec<MetadataFeature>,
}

impl PluginMetadata {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            icon: None,
            trigger_keywords: Vec::new(),
            commands: Vec::new(),
            supported_os: BTreeSet::new(),
            features: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_trigger_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trigger_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands = commands.into_iter().map(MetadataCommand::new).collect();
        self
    }

    #[must_use]
    pub fn with_supported_os(mut self, os: impl IntoIterator<Item = Os>) -> Self {
        self.supported_os = os.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_feature(mut self, feature: MetadataFeature) -> Self {
        self.features.push(feature);
        self
    }

    /// Check if the plugin is queried for global (keyword-less) queries
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.trigger_keywords
            .iter()
            .any(|k| k == GLOBAL_TRIGGER_KEYWORD)
    }

    #[must_use]
    pub fn supports_os(&self, os: Os) -> bool {
        self.supported_os.contains(&os)
    }

    /// Check if `name` is one of this plugin's commands
    #[must_use]
    pub fn has_command(&self, name: &str) -> bool {
        self.commands.iter().any(|c| c.command == name)
    }

    /// Debounce interval in milliseconds, if the plugin asked for one
    #[must_use]
    pub fn debounce_ms(&self) -> Option<u64> {
        self.features.iter().find_map(|f| match f {
            MetadataFeature::Debounce { interval_ms } if *interval_ms > 0 => Some(*interval_ms),
            _ => None,
        })
    }

    #[must_use]
    pub fn ignores_auto_score(&self) -> bool {
        self.features
            .iter()
            .any(|f| matches!(f, MetadataFeature::IgnoreAutoScore))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_ordering_and_next() {
        let first = Epoch::new(1);
        assert!(first.next() > first);
        assert_eq!(first.next().get(), 2);
        assert_eq!(Epoch::ZERO.to_string(), "#0");
    }

    #[test]
    fn test_query_keyword_drops_empty_command() {
        let query = Query::keyword("g ", "g", Some(String::new()), "");
        assert_eq!(query.command(), None);
        assert!(!query.is_global());
    }

    #[test]
    fn test_query_global() {
        let query = Query::global("  hello  world", "hello world");
        assert!(query.is_global());
        assert_eq!(query.trigger_keyword(), "");
        assert_eq!(query.raw_query(), "  hello  world");
        assert_eq!(query.to_string(), "  hello  world");
    }

    #[test]
    fn test_os_parse_aliases() {
        assert_eq!("Darwin".parse::<Os>(), Ok(Os::Macos));
        assert_eq!("LINUX".parse::<Os>(), Ok(Os::Linux));
        assert_eq!("Windows".parse::<Os>(), Ok(Os::Windows));
        assert!("beos".parse::<Os>().is_err());
    }

    #[test]
    fn test_metadata_from_manifest_json() {
        let json = r#"{
            "id": "websearch",
            "name": "Web Search",
            "triggerKeywords": ["g", "*"],
            "commands": [{"command": "search", "description": "Search the web"}],
            "supportedOS": ["Windows", "Macos", "Linux"],
            "features": [
                {"name": "debounce", "intervalMs": 250},
                {"name": "ignoreAutoScore"},
                {"name": "somethingNew"}
            ]
        }"#;

        let metadata: PluginMetadata = serde_json::from_str(json).unwrap();
        assert!(metadata.is_global());
        assert!(metadata.has_command("search"));
        assert!(!metadata.has_command("install"));
        assert!(metadata.supports_os(Os::Linux));
        assert_eq!(metadata.debounce_ms(), Some(250));
        assert!(metadata.ignores_auto_score());
        assert_eq!(metadata.features[2], MetadataFeature::Unknown);
    }

    #[test]
    fn test_metadata_null_lists() {
        let json = r#"{"id": "x", "name": "X", "triggerKeywords": null, "commands": null}"#;
        let metadata: PluginMetadata = serde_json::from_str(json).unwrap();
        assert!(metadata.trigger_keywords.is_empty());
        assert!(metadata.commands.is_empty());
        assert!(metadata.supported_os.is_empty());
        assert_eq!(metadata.debounce_ms(), None);
    }

    #[test]
    fn test_query_result_defaults_from_plugin_json() {
        let json = r#"{"title": "hello world", "subTitle": "greeting"}"#;
        let result: QueryResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.subtitle, "greeting");
        assert!(result.id.is_empty());
        assert_eq!(result.score, None);
        assert_eq!(result.score_or_zero(), 0);
    }

    #[test]
    fn test_icon_serialization_shape() {
        let icon = Icon::Emoji("🔍".to_string());
        let value = serde_json::to_value(&icon).unwrap();
        assert_eq!(value["type"], "emoji");
        assert_eq!(value["data"], "🔍");
    }
}
