mod suggestions;

use crate::aggregate::{Aggregator, RankedSnapshot, UsageBoost};
use crate::config::Config;
use crate::dispatch::{DispatchEvent, Dispatcher, InvocationState};
use crate::plugin::{self, Plugin, PluginContext, PluginInstance, PluginRegistry};
use crate::query::{self, expand_shortcuts};
use crate::router::Router;
use crate::{Error, Result};
use kestrel_types::{Epoch, PluginMetadata, Query, QueryResult};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Core launcher: parses, routes, dispatches and ranks queries.
///
/// Each [`submit`](Self::submit) starts a new epoch and cancels the work of
/// the previous one. Consumers read the ranking through
/// [`subscribe`](Self::subscribe) or [`current_ranked`](Self::current_ranked).
pub struct Launcher {
    config: Config,
    registry: Arc<PluginRegistry>,
    router: Router,
    dispatcher: Dispatcher,
    aggregator: Arc<Aggregator>,
    epoch: AtomicU64,
    current: Mutex<CancellationToken>,
}

impl std::fmt::Debug for Launcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Launcher")
            .field("registry", &self.registry)
            .field("router", &self.router)
            .field("dispatcher", &self.dispatcher)
            .field("epoch", &self.epoch.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Handle to a submitted query
#[derive(Debug)]
pub struct QueryTicket {
    epoch: Epoch,
    query: Arc<Query>,
    done: JoinHandle<HashMap<String, InvocationState>>,
}

impl QueryTicket {
    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    #[must_use]
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Wait until every plugin finished or the query was superseded, and
    /// return the final invocation states.
    pub async fn wait(self) -> HashMap<String, InvocationState> {
        self.done.await.unwrap_or_default()
    }
}

impl Launcher {
    /// Build a launcher with an empty registry; per-plugin settings from
    /// `config` apply as plugins register.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(PluginRegistry::new(config.keyword_case_sensitive));
        for (id, settings) in &config.plugins {
            registry.apply_settings(id, settings.clone());
        }

        Self {
            dispatcher: Dispatcher::from_config(&config),
            aggregator: Arc::new(Aggregator::from_config(&config)),
            router: Router::default(),
            registry,
            epoch: AtomicU64::new(0),
            current: Mutex::new(CancellationToken::new()),
            config,
        }
    }

    /// Override the detected platform
    #[must_use]
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    #[must_use]
    pub fn with_usage_boost(mut self, usage: Arc<dyn UsageBoost>) -> Self {
        self.aggregator = Arc::new(
            Aggregator::from_config(&self.config)
                .with_usage_boost(usage, self.config.usage_boost_weight),
        );
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn current_epoch(&self) -> Epoch {
        Epoch::new(self.epoch.load(Ordering::SeqCst))
    }

    /// Initialize and register a plugin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if `init` fails; the plugin is not
    /// registered. Returns [`Error::InvalidArgument`] for an empty id.
    pub async fn register_plugin(
        &self,
        metadata: PluginMetadata,
        plugin: Arc<dyn Plugin>,
    ) -> Result<Arc<PluginInstance>> {
        self.register_with_context(PluginContext::new(&metadata.id), metadata, plugin)
            .await
    }

    async fn register_with_context(
        &self,
        ctx: PluginContext,
        metadata: PluginMetadata,
        plugin: Arc<dyn Plugin>,
    ) -> Result<Arc<PluginInstance>> {
        plugin
            .init(&ctx)
            .await
            .map_err(|e| Error::Plugin(format!("[{}] init failed: {e}", metadata.id)))?;
        self.registry.register(metadata, plugin)
    }

    /// Remove a plugin; queries submitted afterwards no longer route to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PluginNotFound`] if no plugin with `id` is registered.
    pub fn unregister_plugin(&self, id: &str) -> Result<Arc<PluginInstance>> {
        self.registry
            .unregister(id)
            .ok_or_else(|| Error::PluginNotFound(id.to_string()))
    }

    /// Discover stdio plugins below `dir` and register those that
    /// initialize. Returns how many were registered.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` exists but cannot be listed.
    pub async fn load_plugins(&self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        for process in plugin::discover(dir)? {
            let metadata = process.metadata().clone();
            let ctx = PluginContext::new(&metadata.id)
                .with_plugin_dir(process.working_dir().to_path_buf());
            let id = metadata.id.clone();
            match self
                .register_with_context(ctx, metadata, Arc::new(process))
                .await
            {
                Ok(_) => loaded += 1,
                Err(e) => warn!("[{}] Not registered: {}", id, e),
            }
        }
        info!("Registered {} plugin(s) from {}", loaded, dir.display());
        Ok(loaded)
    }

    /// Parse and route `raw`, then start a new epoch for it.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `raw` cannot be parsed; the
    /// previous query keeps running in that case.
    pub fn submit(&self, raw: &str) -> Result<QueryTicket> {
        let expanded = expand_shortcuts(raw, &self.config.query_shortcuts);
        if expanded != raw {
            debug!("Expanded shortcut {:?} -> {:?}", raw, expanded);
        }
        let query = Arc::new(query::parse(&expanded, &self.registry.keyword_table())?);
        let plugins = self.router.route(&query, &self.registry);

        let (epoch, token) = {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            let epoch = Epoch::new(self.epoch.fetch_add(1, Ordering::SeqCst) + 1);
            current.cancel();
            *current = CancellationToken::new();
            self.aggregator.begin(epoch, Arc::clone(&query), &plugins);
            (epoch, current.clone())
        };

        debug!(
            "Submitted {:?} as epoch {} ({} plugin(s))",
            query.raw_query(),
            epoch,
            plugins.len()
        );

        // Plugins that can fall back to listing their commands
        let commands_of: HashMap<String, Arc<PluginInstance>> =
            if query.is_global() || query.command().is_some() {
                HashMap::new()
            } else {
                plugins
                    .iter()
                    .filter(|p| !p.metadata().commands.is_empty())
                    .map(|p| (p.id().to_string(), Arc::clone(p)))
                    .collect()
            };

        let mut dispatch =
            self.dispatcher
                .dispatch(Arc::clone(&query), epoch, plugins, token.clone());
        let aggregator = Arc::clone(&self.aggregator);
        let task_query = Arc::clone(&query);

        let done = tokio::spawn(async move {
            let mut delivered = HashSet::new();
            loop {
                let event = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    event = dispatch.next_event() => event,
                };
                match event {
                    Some(DispatchEvent::Batch {
                        plugin_id,
                        epoch,
                        results,
                    }) => {
                        if results.is_empty() {
                            delivered.remove(&plugin_id);
                        } else {
                            delivered.insert(plugin_id.clone());
                        }
                        aggregator.ingest(&plugin_id, results, epoch);
                    }
                    Some(DispatchEvent::Finished {
                        plugin_id,
                        epoch,
                        state,
                    }) => {
                        debug!("[{}] Finished: {}", plugin_id, state);
                        if state != InvocationState::Canceled
                            && !delivered.contains(&plugin_id)
                            && let Some(instance) = commands_of.get(&plugin_id)
                        {
                            let commands =
                                suggestions::command_suggestions(&task_query, instance.metadata());
                            if !commands.is_empty() {
                                debug!("[{}] No results, listing {} command(s)", plugin_id, commands.len());
                                aggregator.ingest(&plugin_id, commands, epoch);
                            }
                        }
                    }
                    None => break,
                }
            }
            dispatch.states()
        });

        Ok(QueryTicket { epoch, query, done })
    }

    /// Submit `raw`, wait for every plugin, and return the ranking.
    ///
    /// Returns an empty list if a newer query superseded this one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `raw` cannot be parsed.
    pub async fn query_once(&self, raw: &str) -> Result<Vec<QueryResult>> {
        let ticket = self.submit(raw)?;
        let epoch = ticket.epoch();
        ticket.wait().await;

        let snapshot = self.aggregator.snapshot();
        if snapshot.epoch == epoch {
            Ok(snapshot.results.as_ref().clone())
        } else {
            Ok(Vec::new())
        }
    }

    /// Cancel the in-flight query without starting another
    pub fn cancel_current(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    #[must_use]
    pub fn current_ranked(&self) -> Vec<QueryResult> {
        self.aggregator.current_ranked()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RankedSnapshot> {
        self.aggregator.subscribe()
    }
}
