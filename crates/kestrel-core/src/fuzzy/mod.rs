//! Fuzzy subsequence matcher used to score results that carry no score.
//!
//! Alignment and the streak/boundary bonuses come from nucleo's optimal
//! matcher. On top of that an exact match outranks a prefix match, which
//! outranks any other alignment, and shorter candidates get a small density
//! bonus.

use nucleo_matcher::{Config, Matcher, Utf32Str, chars};
use std::cell::RefCell;

const BONUS_PREFIX: u64 = 25;
const BONUS_EXACT: u64 = 50;
const DENSITY_WEIGHT: u64 = 20;

/// Default minimum score for [`FuzzyMatcher::is_match`].
///
/// A lone mid-word character scores below it.
pub const DEFAULT_THRESHOLD: u64 = 20;

thread_local! {
    static MATCHER: RefCell<Matcher> = RefCell::new(Matcher::new(matcher_config()));
}

fn matcher_config() -> Config {
    let mut config = Config::DEFAULT;
    config.prefer_prefix = true;
    config
}

/// Outcome of scoring one candidate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuzzyMatch {
    /// Zero when the pattern is not a subsequence of the candidate
    pub score: u64,

    /// Char indices into the candidate, one per pattern char. Combining
    /// sequences count as a single char.
    pub indices: Vec<usize>,
}

impl FuzzyMatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Stateless matcher; holds only the precision threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuzzyMatcher {
    threshold: u64,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl FuzzyMatcher {
    #[must_use]
    pub const fn new(threshold: u64) -> Self {
        Self { threshold }
    }

    #[must_use]
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    #[must_use]
    pub fn is_match(&self, score: u64) -> bool {
        score > 0 && score >= self.threshold
    }

    /// Score `candidate` against `pattern`.
    #[must_use]
    pub fn score(&self, pattern: &str, candidate: &str) -> FuzzyMatch {
        score(pattern, candidate)
    }

    /// Best score over several candidate strings (title, subtitle, ...)
    #[must_use]
    pub fn best_score<'a>(&self, pattern: &str, candidates: impl IntoIterator<Item = &'a str>) -> u64 {
        candidates
            .into_iter()
            .map(|c| score(pattern, c).score)
            .max()
            .unwrap_or(0)
    }
}

fn fold(c: char) -> char {
    chars::to_lower_case(chars::normalize(c))
}

/// Score `candidate` against `pattern`.
///
/// Case-insensitive, with latin diacritics folded on both sides.
#[must_use]
pub fn score(pattern: &str, candidate: &str) -> FuzzyMatch {
    // The matcher folds the haystack itself but expects a prepared needle
    let needle: String = pattern.chars().map(fold).collect();
    if needle.is_empty() {
        return FuzzyMatch::default();
    }

    let mut haystack_buf = Vec::new();
    let mut needle_buf = Vec::new();
    let haystack = Utf32Str::new(candidate, &mut haystack_buf);
    let needle_str = Utf32Str::new(&needle, &mut needle_buf);

    let mut indices = Vec::new();
    let Some(base) =
        MATCHER.with_borrow_mut(|matcher| matcher.fuzzy_indices(haystack, needle_str, &mut indices))
    else {
        return FuzzyMatch::default();
    };

    let folded: String = candidate.chars().map(fold).collect();
    let placement = if folded == needle {
        BONUS_EXACT
    } else if folded.starts_with(&needle) {
        BONUS_PREFIX
    } else {
        0
    };

    let matched = needle_str.len() as u64;
    let density = DENSITY_WEIGHT * matched / (haystack.len() as u64).max(1);

    FuzzyMatch {
        score: (u64::from(base) + placement + density).max(1),
        indices: indices.into_iter().map(|i| i as usize).collect(),
    }
}
