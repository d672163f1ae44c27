//! Continuous merge of plugin batches into one ranked, de-duplicated list.
//!
//! Each query gets a fresh [`Session`]; batches tagged with any other
//! epoch are dropped. Scoring and sorting happen outside the session lock,
//! which only guards swapping a plugin's batch.

use crate::config::Config;
use crate::fuzzy::FuzzyMatcher;
use crate::plugin::PluginInstance;
use kestrel_types::{Epoch, Query, QueryResult};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::watch;
use tracing::debug;

/// What a usage count is keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultIdentity<'a> {
    pub plugin_id: &'a str,
    pub title: &'a str,
    pub subtitle: &'a str,
}

impl<'a> ResultIdentity<'a> {
    #[must_use]
    pub fn of(result: &'a QueryResult) -> Self {
        Self {
            plugin_id: &result.plugin_id,
            title: &result.title,
            subtitle: &result.subtitle,
        }
    }
}

/// Source of per-result usage counts, e.g. how often the user picked it.
pub trait UsageBoost: Send + Sync {
    fn usage_count(&self, identity: &ResultIdentity<'_>) -> u64;
}

/// A published ranking
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedSnapshot {
    pub epoch: Epoch,

    /// Bumped on every accepted batch within the epoch
    pub generation: u64,

    pub results: Arc<Vec<QueryResult>>,
}

#[derive(Debug, Clone, Copy)]
struct PluginRank {
    priority: i32,
    order: u64,
    ignore_auto_score: bool,
}

impl Default for PluginRank {
    fn default() -> Self {
        Self {
            priority: 0,
            order: u64::MAX,
            ignore_auto_score: false,
        }
    }
}

#[derive(Debug, Default)]
struct Batches {
    by_plugin: HashMap<String, Arc<Vec<QueryResult>>>,
    generation: u64,
}

/// Aggregation state for exactly one epoch
#[derive(Debug)]
struct Session {
    epoch: Epoch,
    query: Arc<Query>,
    ranks: HashMap<String, PluginRank>,
    batches: Mutex<Batches>,
}

impl Session {
    fn new(epoch: Epoch, query: Arc<Query>, plugins: &[Arc<PluginInstance>]) -> Self {
        let ranks = plugins
            .iter()
            .map(|p| {
                (
                    p.id().to_string(),
                    PluginRank {
                        priority: p.priority(),
                        order: p.registration_order(),
                        ignore_auto_score: p.metadata().ignores_auto_score(),
                    },
                )
            })
            .collect();
        Self {
            epoch,
            query,
            ranks,
            batches: Mutex::new(Batches::default()),
        }
    }

    fn rank(&self, plugin_id: &str) -> PluginRank {
        self.ranks.get(plugin_id).copied().unwrap_or_default()
    }
}

/// Merges batches for the current query and publishes the ranked list.
pub struct Aggregator {
    session: RwLock<Arc<Session>>,
    matcher: FuzzyMatcher,
    usage: Option<Arc<dyn UsageBoost>>,
    usage_weight: u64,
    max_results: usize,
    published: watch::Sender<RankedSnapshot>,
}

impl fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("epoch", &self.current_epoch())
            .field("matcher", &self.matcher)
            .field("usage_boost", &self.usage.is_some())
            .field("usage_weight", &self.usage_weight)
            .field("max_results", &self.max_results)
            .finish_non_exhaustive()
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(FuzzyMatcher::default())
    }
}

impl Aggregator {
    #[must_use]
    pub fn new(matcher: FuzzyMatcher) -> Self {
        let (published, _) = watch::channel(RankedSnapshot::default());
        Self {
            session: RwLock::new(Arc::new(Session::new(
                Epoch::ZERO,
                Arc::new(Query::default()),
                &[],
            ))),
            matcher,
            usage: None,
            usage_weight: 0,
            max_results: 0,
            published,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut aggregator = Self::new(config.fuzzy_matcher()).with_max_results(config.max_results);
        aggregator.usage_weight = config.usage_boost_weight;
        aggregator
    }

    /// Add `count * weight` to every result's score for plugins that do not
    /// opt out of automatic scoring.
    #[must_use]
    pub fn with_usage_boost(mut self, usage: Arc<dyn UsageBoost>, weight: u64) -> Self {
        self.usage = Some(usage);
        self.usage_weight = weight;
        self
    }

    /// Keep only the first `max` ranked results; 0 keeps all.
    #[must_use]
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    fn session(&self) -> Arc<Session> {
        Arc::clone(&self.session.read().unwrap_or_else(PoisonError::into_inner))
    }

    #[must_use]
    pub fn current_epoch(&self) -> Epoch {
        self.session().epoch
    }

    /// Start a fresh session for `epoch`, clearing the visible list.
    ///
    /// Ignored if a newer epoch has already begun.
    pub fn begin(&self, epoch: Epoch, query: Arc<Query>, plugins: &[Arc<PluginInstance>]) {
        let fresh = Arc::new(Session::new(epoch, query, plugins));
        {
            let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
            if session.epoch > epoch {
                debug!("Ignoring begin for {} after {}", epoch, session.epoch);
                return;
            }
            *session = fresh;
        }

        self.published.send_if_modified(|current| {
            if epoch > current.epoch {
                *current = RankedSnapshot {
                    epoch,
                    generation: 0,
                    results: Arc::default(),
                };
                true
            } else {
                false
            }
        });
    }

    /// Replace `plugin_id`'s batch in the current session and republish.
    ///
    /// Returns `false` if the batch belongs to another epoch and was dropped.
    pub fn ingest(&self, plugin_id: &str, results: Vec<QueryResult>, epoch: Epoch) -> bool {
        let session = self.session();
        if session.epoch != epoch {
            debug!(
                "[{}] Dropping stale batch from {} (current {})",
                plugin_id, epoch, session.epoch
            );
            return false;
        }

        let scored = Arc::new(self.resolve_scores(&session, plugin_id, results));

        let (generation, batches) = {
            let mut batches = session
                .batches
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            batches.by_plugin.insert(plugin_id.to_string(), scored);
            batches.generation += 1;
            (batches.generation, batches.by_plugin.clone())
        };

        let ranked = Arc::new(self.rank(&session, &batches));

        let published = self.published.send_if_modified(|current| {
            if (epoch, generation) > (current.epoch, current.generation) {
                *current = RankedSnapshot {
                    epoch,
                    generation,
                    results: ranked,
                };
                true
            } else {
                false
            }
        });
        if !published {
            debug!(
                "[{}] Generation {} superseded before publish",
                plugin_id, generation
            );
        }
        true
    }

    /// The latest published ranking
    #[must_use]
    pub fn current_ranked(&self) -> Vec<QueryResult> {
        self.published.borrow().results.as_ref().clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> RankedSnapshot {
        self.published.borrow().clone()
    }

    /// Change notifications; the receiver always holds the latest snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RankedSnapshot> {
        self.published.subscribe()
    }

    fn resolve_scores(
        &self,
        session: &Session,
        plugin_id: &str,
        mut results: Vec<QueryResult>,
    ) -> Vec<QueryResult> {
        let rank = session.rank(plugin_id);
        let search = session.query.search();

        for result in &mut results {
            let base = result
                .score
                .unwrap_or_else(|| self.default_score(search, result));

            let boost = match &self.usage {
                Some(usage) if !rank.ignore_auto_score => usage
                    .usage_count(&ResultIdentity::of(result))
                    .saturating_mul(self.usage_weight),
                _ => 0,
            };

            result.score = Some(base.saturating_add(boost));
        }
        results
    }

    /// Best fuzzy score of title or subtitle; non-matches score 0 but are kept.
    fn default_score(&self, search: &str, result: &QueryResult) -> u64 {
        if search.is_empty() {
            return 0;
        }
        let score = self
            .matcher
            .best_score(search, [result.title.as_str(), result.subtitle.as_str()]);
        if self.matcher.is_match(score) {
            score
        } else {
            0
        }
    }

    fn rank(
        &self,
        session: &Session,
        batches: &HashMap<String, Arc<Vec<QueryResult>>>,
    ) -> Vec<QueryResult> {
        let mut keyed: Vec<_> = batches
            .iter()
            .flat_map(|(plugin_id, batch)| {
                let rank = session.rank(plugin_id);
                batch.iter().enumerate().map(move |(index, result)| {
                    (
                        (
                            Reverse(result.score_or_zero()),
                            Reverse(rank.priority),
                            rank.order,
                            plugin_id.as_str(),
                            index,
                        ),
                        result,
                    )
                })
            })
            .collect();
        keyed.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let mut seen = HashSet::new();
        let mut ranked: Vec<QueryResult> = keyed
            .into_iter()
            .filter(|(_, r)| seen.insert((r.title.as_str(), r.subtitle.as_str())))
            .map(|(_, r)| r.clone())
            .collect();

        if self.max_results > 0 {
            ranked.truncate(self.max_results);
        }
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agg() -> Aggregator {
        Aggregator::default()
    }

    fn begin(agg: &Aggregator, epoch: u64, search: &str) {
        agg.begin(
            Epoch::new(epoch),
            Arc::new(Query::global(search, search)),
            &[],
        );
    }

    #[test]
    fn test_ingest_publishes_sorted() {
        let agg = agg();
        begin(&agg, 1, "x");
        assert!(agg.ingest(
            "a",
            vec![
                QueryResult::new("low").with_score(1),
                QueryResult::new("high").with_score(9),
            ],
            Epoch::new(1),
        ));
        let titles: Vec<_> = agg.current_ranked().into_iter().map(|r| r.title).collect();
        assert_eq!(titles, vec!["high", "low"]);
    }

    #[test]
    fn test_batch_replaces_previous() {
        let agg = agg();
        begin(&agg, 1, "x");
        agg.ingest("a", vec![QueryResult::new("first").with_score(1)], Epoch::new(1));
        agg.ingest("a", vec![QueryResult::new("second").with_score(1)], Epoch::new(1));
        let ranked = agg.current_ranked();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].title, "second");
        assert_eq!(agg.snapshot().generation, 2);
    }

    #[test]
    fn test_begin_clears_and_rejects_older() {
        let agg = agg();
        begin(&agg, 2, "x");
        agg.ingest("a", vec![QueryResult::new("r").with_score(1)], Epoch::new(2));
        begin(&agg, 1, "x");
        assert_eq!(agg.current_epoch(), Epoch::new(2));
        assert_eq!(agg.current_ranked().len(), 1);

        begin(&agg, 3, "x");
        assert!(agg.current_ranked().is_empty());
        assert_eq!(agg.snapshot().epoch, Epoch::new(3));
    }

    #[test]
    fn test_max_results_truncates() {
        let agg = Aggregator::default().with_max_results(2);
        begin(&agg, 1, "x");
        agg.ingest(
            "a",
            (0..5).map(|i| QueryResult::new(format!("r{i}")).with_score(i)).collect(),
            Epoch::new(1),
        );
        let titles: Vec<_> = agg.current_ranked().into_iter().map(|r| r.title).collect();
        assert_eq!(titles, vec!["r4", "r3"]);
    }

    #[test]
    fn test_default_score_from_title() {
        let agg = agg();
        begin(&agg, 1, "fire");
        agg.ingest(
            "apps",
            vec![QueryResult::new("Firefox"), QueryResult::new("Terminal")],
            Epoch::new(1),
        );
        let ranked = agg.current_ranked();
        assert_eq!(ranked[0].title, "Firefox");
        assert!(ranked[0].score.unwrap() > 0);
        assert_eq!(ranked[1].score, Some(0));
    }
}
