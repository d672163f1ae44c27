//! Tests for query parsing

use crate::Error;
use crate::config::QueryShortcut;
use crate::query::{KeywordTable, expand_shortcuts, parse};
use proptest::prelude::*;

fn table() -> KeywordTable {
    let mut table = KeywordTable::default();
    table.insert("g", ["search", "images"]);
    table.insert("calc", std::iter::empty::<&str>());
    table
}

#[test]
fn test_parse_empty_is_global() {
    let q = parse("", &table()).unwrap();
    assert!(q.is_global());
    assert_eq!(q.search(), "");
    assert_eq!(q.command(), None);

    let q = parse("   \t ", &table()).unwrap();
    assert!(q.is_global());
    assert_eq!(q.search(), "");
    assert_eq!(q.raw_query(), "   \t ");
}

#[test]
fn test_parse_keyword_command_search() {
    let q = parse("g search hello world", &table()).unwrap();
    assert_eq!(q.trigger_keyword(), "g");
    assert_eq!(q.command(), Some("search"));
    assert_eq!(q.search(), "hello world");
    assert!(!q.is_global());
}

#[test]
fn test_parse_keyword_without_command() {
    let q = parse("g rust traits", &table()).unwrap();
    assert_eq!(q.trigger_keyword(), "g");
    assert_eq!(q.command(), None);
    assert_eq!(q.search(), "rust traits");
}

#[test]
fn test_parse_bare_keyword() {
    let q = parse("calc", &table()).unwrap();
    assert_eq!(q.trigger_keyword(), "calc");
    assert_eq!(q.command(), None);
    assert_eq!(q.search(), "");

    let q = parse("  g  ", &table()).unwrap();
    assert_eq!(q.trigger_keyword(), "g");
    assert_eq!(q.search(), "");
}

#[test]
fn test_parse_command_without_search() {
    let q = parse("g images", &table()).unwrap();
    assert_eq!(q.command(), Some("images"));
    assert_eq!(q.search(), "");
}

#[test]
fn test_parse_command_only_first_token() {
    // Only the token right after the keyword can be a command
    let q = parse("g hello search", &table()).unwrap();
    assert_eq!(q.command(), None);
    assert_eq!(q.search(), "hello search");
}

#[test]
fn test_parse_collapses_whitespace_but_keeps_raw() {
    let raw = "  g   search  hello \t  world  ";
    let q = parse(raw, &table()).unwrap();
    assert_eq!(q.search(), "hello world");
    assert_eq!(q.raw_query(), raw);
}

#[test]
fn test_parse_unknown_first_token_is_global() {
    let q = parse("firefox   nightly", &table()).unwrap();
    assert!(q.is_global());
    assert_eq!(q.trigger_keyword(), "");
    assert_eq!(q.search(), "firefox nightly");
}

#[test]
fn test_parse_keyword_must_be_whole_token() {
    let q = parse("gsearch hello", &table()).unwrap();
    assert!(q.is_global());
    assert_eq!(q.search(), "gsearch hello");
}

#[test]
fn test_parse_case_sensitive_by_default() {
    let q = parse("G search x", &table()).unwrap();
    assert!(q.is_global());
    assert_eq!(q.search(), "G search x");
}

#[test]
fn test_parse_case_insensitive_table() {
    let mut table = KeywordTable::new(false);
    table.insert("g", ["search"]);
    let q = parse("G SEARCH x", &table).unwrap();
    assert_eq!(q.trigger_keyword(), "g");
    assert_eq!(q.command(), Some("search"));
    assert_eq!(q.search(), "x");
}

#[test]
fn test_parse_global_sentinel_is_not_a_keyword() {
    let table = KeywordTable::from_keywords(["*"]);
    let q = parse("* hello", &table).unwrap();
    assert!(q.is_global());
    assert_eq!(q.search(), "* hello");
}

#[test]
fn test_parse_rejects_nul() {
    let err = parse("g search \0", &table()).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn test_shortcut_then_parse() {
    let shortcuts = vec![QueryShortcut::new("gs", "g search {0}")];
    let expanded = expand_shortcuts("gs rust tokio", &shortcuts);
    assert_eq!(expanded, "g search rust tokio");

    let q = parse(&expanded, &table()).unwrap();
    assert_eq!(q.command(), Some("search"));
    assert_eq!(q.search(), "rust tokio");
}

fn keyword_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,5}"
}

/// Single-spaced words, no leading or trailing whitespace
fn search_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[A-Za-z0-9.+-]{1,8}", 1..6).prop_map(|words| words.join(" "))
}

proptest! {
    #[test]
    fn prop_keyword_round_trip(k in keyword_strategy(), s in search_strategy()) {
        let table = KeywordTable::from_keywords([k.as_str()]);
        let raw = format!("{k} {s}");
        let q = parse(&raw, &table).unwrap();
        prop_assert_eq!(q.trigger_keyword(), k.as_str());
        prop_assert_eq!(q.search(), s.as_str());
        prop_assert_eq!(q.raw_query(), raw.as_str());
    }

    #[test]
    fn prop_global_fallback(
        words in prop::collection::vec("[A-Za-z0-9]{1,6}", 1..6),
        gaps in prop::collection::vec("[ \t]{1,3}", 6),
        lead in "[ \t]{0,2}",
        trail in "[ \t]{0,2}",
    ) {
        let table = table();
        prop_assume!(!table.contains(&words[0]));

        let mut raw = lead.clone();
        for (i, word) in words.iter().enumerate() {
            if i > 0 {
                raw.push_str(&gaps[i]);
            }
            raw.push_str(word);
        }
        raw.push_str(&trail);

        let q = parse(&raw, &table).unwrap();
        prop_assert_eq!(q.trigger_keyword(), "");
        prop_assert_eq!(q.search(), words.join(" "));
    }

    #[test]
    fn prop_search_never_padded(raw in "[ a-z\t]{0,30}") {
        let q = parse(&raw, &table()).unwrap();
        prop_assert_eq!(q.search().trim(), q.search());
        prop_assert!(!q.search().contains("  "));
    }
}
