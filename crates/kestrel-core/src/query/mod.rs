//! Query parsing: raw text to a structured [`Query`].

mod shortcut;

pub use shortcut::expand_shortcuts;

use crate::{Error, Result};
use kestrel_types::{GLOBAL_TRIGGER_KEYWORD, Query};
use std::collections::{BTreeSet, HashMap};

/// Known trigger keywords and the commands registered under each.
///
/// Lookups honour the table's case sensitivity but always hand back the
/// keyword and command as they were registered.
#[derive(Debug, Clone)]
pub struct KeywordTable {
    case_sensitive: bool,
    entries: HashMap<String, KeywordEntry>,
}

#[derive(Debug, Clone)]
struct KeywordEntry {
    keyword: String,
    commands: BTreeSet<String>,
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self::new(true)
    }
}

impl KeywordTable {
    #[must_use]
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            case_sensitive,
            entries: HashMap::new(),
        }
    }

    /// Case-sensitive table with the given keywords and no commands
    #[must_use]
    pub fn from_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::default();
        for keyword in keywords {
            table.insert(keyword.as_ref(), std::iter::empty::<&str>());
        }
        table
    }

    /// Add `keyword`, merging `commands` into any already registered for it.
    ///
    /// The global sentinel and empty keywords are ignored.
    pub fn insert<I, S>(&mut self, keyword: &str, commands: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if keyword.is_empty() || keyword == GLOBAL_TRIGGER_KEYWORD {
            return;
        }
        let entry = self
            .entries
            .entry(self.key(keyword))
            .or_insert_with(|| KeywordEntry {
                keyword: keyword.to_string(),
                commands: BTreeSet::new(),
            });
        entry
            .commands
            .extend(commands.into_iter().map(|c| c.as_ref().to_string()));
    }

    #[must_use]
    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, keyword: &str) -> bool {
        self.lookup(keyword).is_some()
    }

    /// Registered spelling of `keyword`, if known
    #[must_use]
    pub fn keyword(&self, keyword: &str) -> Option<&str> {
        self.lookup(keyword).map(|e| e.keyword.as_str())
    }

    /// Registered spelling of `command` under `keyword`, if known
    #[must_use]
    pub fn command(&self, keyword: &str, command: &str) -> Option<&str> {
        let entry = self.lookup(keyword)?;
        if self.case_sensitive {
            entry.commands.get(command).map(String::as_str)
        } else {
            entry
                .commands
                .iter()
                .find(|c| c.to_lowercase() == command.to_lowercase())
                .map(String::as_str)
        }
    }

    fn lookup(&self, keyword: &str) -> Option<&KeywordEntry> {
        self.entries.get(&self.key(keyword))
    }

    fn key(&self, keyword: &str) -> String {
        if self.case_sensitive {
            keyword.to_string()
        } else {
            keyword.to_lowercase()
        }
    }
}

/// Parse raw input into a [`Query`].
///
/// The first whitespace-delimited token selects a trigger keyword when it
/// is known; the next token is consumed as a command when that keyword
/// registered it. Everything else becomes the search text with whitespace
/// collapsed. `raw_query` keeps the input verbatim.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if `raw` contains a NUL character.
pub fn parse(raw: &str, keywords: &KeywordTable) -> Result<Query> {
    if raw.contains('\0') {
        return Err(Error::InvalidArgument(
            "query text contains a NUL character".to_string(),
        ));
    }

    let mut tokens = raw.split_whitespace();
    let Some(first) = tokens.next() else {
        return Ok(Query::global(raw, ""));
    };

    let Some(keyword) = keywords.keyword(first) else {
        return Ok(Query::global(raw, collapse(raw.split_whitespace())));
    };

    let mut rest = tokens.peekable();
    let command = rest
        .peek()
        .and_then(|token| keywords.command(keyword, token))
        .map(str::to_string);
    if command.is_some() {
        rest.next();
    }

    Ok(Query::keyword(raw, keyword, command, collapse(rest)))
}

fn collapse<'a>(tokens: impl Iterator<Item = &'a str>) -> String {
    tokens.collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_ignores_global_sentinel() {
        let mut table = KeywordTable::default();
        table.insert("*", ["x"]);
        table.insert("", ["x"]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_insert_merges_commands() {
        let mut table = KeywordTable::default();
        table.insert("g", ["search"]);
        table.insert("g", ["images"]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.command("g", "search"), Some("search"));
        assert_eq!(table.command("g", "images"), Some("images"));
        assert_eq!(table.command("g", "maps"), None);
    }

    #[test]
    fn test_case_insensitive_returns_registered_spelling() {
        let mut table = KeywordTable::new(false);
        table.insert("Gh", ["Issues"]);
        assert_eq!(table.keyword("GH"), Some("Gh"));
        assert_eq!(table.command("gh", "issues"), Some("Issues"));
    }

    #[test]
    fn test_nul_is_invalid() {
        let err = parse("g\0", &KeywordTable::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
