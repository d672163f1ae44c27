use crate::config::QueryShortcut;
use regex::Regex;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\d+)\}").expect("placeholder pattern is valid"));

/// Expand the longest shortcut that prefixes `raw`.
///
/// Shortcuts without placeholders replace the prefix in place. Shortcuts
/// with `{0}`, `{1}`, ... take that many following words as parameters;
/// extra words are appended after the expansion. Returns `raw` unchanged
/// when nothing matches.
#[must_use]
pub fn expand_shortcuts(raw: &str, shortcuts: &[QueryShortcut]) -> String {
    let mut candidates: Vec<&QueryShortcut> = shortcuts
        .iter()
        .filter(|s| !s.shortcut.is_empty() && raw.starts_with(&s.shortcut))
        .collect();
    candidates.sort_by_key(|s| std::cmp::Reverse(s.shortcut.chars().count()));

    let Some(shortcut) = candidates.first() else {
        return raw.to_string();
    };
    let rest = &raw[shortcut.shortcut.len()..];

    let arity = PLACEHOLDER
        .captures_iter(&shortcut.query)
        .filter_map(|c| c[1].parse::<usize>().ok())
        .max()
        .map(|max| max + 1);

    let Some(arity) = arity else {
        return format!("{}{rest}", shortcut.query);
    };

    let words: Vec<&str> = rest.split_whitespace().collect();
    let (params, extra) = words.split_at(arity.min(words.len()));

    let mut expanded = PLACEHOLDER
        .replace_all(&shortcut.query, |caps: &regex::Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| params.get(i))
                .copied()
                .unwrap_or_default()
                .to_string()
        })
        .into_owned();

    for word in extra {
        expanded.push(' ');
        expanded.push_str(word);
    }
    expanded
}
