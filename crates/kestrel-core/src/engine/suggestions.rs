//! Command suggestions shown when a keyword query names no command and the
//! plugin itself has nothing to show.

use kestrel_types::{PluginMetadata, Query, QueryResult};
use serde_json::json;

/// Commands of `metadata` whose name contains the search text, in declaration
/// order. Empty for global queries and for queries that already name a
/// command.
///
/// Matching is case-insensitive; an empty search lists every command.
/// Results are unscored so the aggregator ranks them against the search.
pub(crate) fn command_suggestions(query: &Query, metadata: &PluginMetadata) -> Vec<QueryResult> {
    if query.is_global() || query.command().is_some() {
        return Vec::new();
    }

    let needle = query.search().to_lowercase();
    metadata
        .commands
        .iter()
        .filter(|c| c.command.to_lowercase().contains(&needle))
        .map(|c| {
            let mut result = QueryResult::new(c.command.as_str())
                .with_id(format!("{}:command:{}", metadata.id, c.command))
                .with_action(json!({
                    "changeQuery": format!("{} {} ", query.trigger_keyword(), c.command),
                }));
            if let Some(description) = &c.description {
                result = result.with_subtitle(description.as_str());
            }
            result.icon.clone_from(&metadata.icon);
            result.plugin_id.clone_from(&metadata.id);
            result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_types::Icon;

    fn web() -> PluginMetadata {
        let mut metadata = PluginMetadata::new("web", "Web")
            .with_trigger_keywords(["g"])
            .with_commands(["search", "images", "Settings"]);
        metadata.commands[0].description = Some("Search the web".to_string());
        metadata.icon = Some(Icon::Emoji("🔍".to_string()));
        metadata
    }

    #[test]
    fn test_empty_search_lists_every_command() {
        let query = Query::keyword("g", "g", None, "");
        let results = command_suggestions(&query, &web());
        let titles: Vec<_> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["search", "images", "Settings"]);
        assert_eq!(results[0].subtitle, "Search the web");
        assert_eq!(results[0].plugin_id, "web");
        assert_eq!(results[0].id, "web:command:search");
        assert_eq!(results[0].icon, Some(Icon::Emoji("🔍".to_string())));
        assert_eq!(results[0].score, None);
        assert_eq!(results[0].action, Some(json!({ "changeQuery": "g search " })));
        assert!(results[1].subtitle.is_empty());
    }

    #[test]
    fn test_search_filters_by_substring() {
        let query = Query::keyword("g se", "g", None, "se");
        let results = command_suggestions(&query, &web());
        let titles: Vec<_> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["search", "Settings"]);

        let query = Query::keyword("g zz", "g", None, "zz");
        assert!(command_suggestions(&query, &web()).is_empty());
    }

    #[test]
    fn test_no_suggestions_for_global_or_command_queries() {
        assert!(command_suggestions(&Query::global("se", "se"), &web()).is_empty());

        let query = Query::keyword("g search x", "g", Some("search".to_string()), "x");
        assert!(command_suggestions(&query, &web()).is_empty());
    }

    #[test]
    fn test_plugin_without_commands() {
        let metadata = PluginMetadata::new("calc", "Calc").with_trigger_keywords(["="]);
        let query = Query::keyword("=", "=", None, "");
        assert!(command_suggestions(&query, &metadata).is_empty());
    }
}
