//! Config validation - warns about unknown fields

use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

const TOP_LEVEL_KEYS: &[&str] = &[
    "pluginTimeoutMs",
    "keywordCaseSensitive",
    "fuzzyThreshold",
    "usageBoostWeight",
    "maxResults",
    "channelCapacity",
    "queryShortcuts",
    "plugins",
];

const SHORTCUT_KEYS: &[&str] = &["shortcut", "query"];

const PLUGIN_SETTING_KEYS: &[&str] = &["disabled", "triggerKeywords", "priority"];

/// Validate JSON config and warn about unknown fields.
pub fn warn_unknown_fields(content: &str, config_name: &str) {
    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return;
    };

    for path in find_unknown_keys(&value) {
        warn!("Unknown config field in {config_name}: {path}");
    }
}

/// Returns paths like `plugins.calc.unknownField`.
fn find_unknown_keys(value: &Value) -> Vec<String> {
    let mut unknowns = Vec::new();
    let Value::Object(obj) = value else {
        return unknowns;
    };

    let top: HashSet<&str> = TOP_LEVEL_KEYS.iter().copied().collect();
    for (key, child) in obj {
        if !top.contains(key.as_str()) {
            unknowns.push(key.clone());
            continue;
        }

        match (key.as_str(), child) {
            ("queryShortcuts", Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    unknowns.extend(unknown_in_object(
                        item,
                        SHORTCUT_KEYS,
                        &format!("queryShortcuts[{i}]"),
                    ));
                }
            }
            ("plugins", Value::Object(plugins)) => {
                for (id, settings) in plugins {
                    unknowns.extend(unknown_in_object(
                        settings,
                        PLUGIN_SETTING_KEYS,
                        &format!("plugins.{id}"),
                    ));
                }
            }
            _ => {}
        }
    }

    unknowns
}

fn unknown_in_object(value: &Value, expected: &[&str], prefix: &str) -> Vec<String> {
    let Value::Object(obj) = value else {
        return Vec::new();
    };
    obj.keys()
        .filter(|k| !expected.contains(&k.as_str()))
        .map(|k| format!("{prefix}.{k}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unknowns(json: &str) -> Vec<String> {
        let value: Value = serde_json::from_str(json).unwrap();
        let mut keys = find_unknown_keys(&value);
        keys.sort();
        keys
    }

    #[test]
    fn test_known_fields_pass() {
        let json = r#"{
            "pluginTimeoutMs": 500,
            "queryShortcuts": [{"shortcut": "gh", "query": "web github {0}"}],
            "plugins": {"calc": {"disabled": true, "priority": 3}}
        }"#;
        assert!(unknowns(json).is_empty());
    }

    #[test]
    fn test_unknown_top_level() {
        assert_eq!(unknowns(r#"{"theme": "dark"}"#), vec!["theme"]);
    }

    #[test]
    fn test_unknown_nested() {
        let json = r#"{
            "queryShortcuts": [{"shortcut": "a", "query": "b", "icon": "x"}],
            "plugins": {"calc": {"enabled": true}}
        }"#;
        assert_eq!(
            unknowns(json),
            vec!["plugins.calc.enabled", "queryShortcuts[0].icon"]
        );
    }

    #[test]
    fn test_invalid_json_is_ignored() {
        warn_unknown_fields("{not json", "config.json");
    }
}
