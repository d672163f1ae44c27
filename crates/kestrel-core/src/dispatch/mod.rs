//! Parallel plugin invocation with timeouts, fault isolation and
//! cancellation.

mod sink;

pub use sink::BatchSink;

use crate::config::Config;
use crate::plugin::PluginInstance;
use kestrel_types::{Epoch, Query, QueryResult};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lifecycle of one plugin invocation.
///
/// `Pending -> Running -> {Completed | TimedOut | Failed | Canceled}`.
/// A debounced plugin cancelled while waiting goes straight from `Pending`
/// to `Canceled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationState {
    Pending,
    Running,
    Completed,
    TimedOut,
    Failed(String),
    Canceled,
}

impl InvocationState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Running => f.write_str("running"),
            Self::Completed => f.write_str("completed"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Canceled => f.write_str("canceled"),
        }
    }
}

/// Events produced while a query is being answered, all tagged with the
/// query's epoch.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// Replaces everything `plugin_id` delivered earlier for this epoch
    Batch {
        plugin_id: String,
        epoch: Epoch,
        results: Vec<QueryResult>,
    },
    Finished {
        plugin_id: String,
        epoch: Epoch,
        state: InvocationState,
    },
}

impl DispatchEvent {
    #[must_use]
    pub fn epoch(&self) -> Epoch {
        match self {
            Self::Batch { epoch, .. } | Self::Finished { epoch, .. } => *epoch,
        }
    }

    #[must_use]
    pub fn plugin_id(&self) -> &str {
        match self {
            Self::Batch { plugin_id, .. } | Self::Finished { plugin_id, .. } => plugin_id,
        }
    }
}

type StateTable = Arc<Mutex<HashMap<String, InvocationState>>>;

/// Fans a query out to plugins, one tokio task each.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    timeout: Duration,
    channel_capacity: usize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new(timeout: Duration, channel_capacity: usize) -> Self {
        Self {
            timeout,
            channel_capacity: channel_capacity.max(1),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.plugin_timeout(), config.channel_capacity)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start invoking `plugins` for `query` under `epoch`.
    ///
    /// Must be called from within a tokio runtime. Cancelling `cancel`
    /// marks every unfinished invocation `Canceled` and stops listening to
    /// it.
    #[must_use]
    pub fn dispatch(
        &self,
        query: Arc<Query>,
        epoch: Epoch,
        plugins: Vec<Arc<PluginInstance>>,
        cancel: CancellationToken,
    ) -> Dispatch {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let states: StateTable = Arc::new(Mutex::new(
            plugins
                .iter()
                .map(|p| (p.id().to_string(), InvocationState::Pending))
                .collect(),
        ));

        debug!(
            "Dispatching {} to {} plugin(s) under epoch {}",
            query,
            plugins.len(),
            epoch
        );

        let remaining = plugins.len();
        let handles = plugins
            .into_iter()
            .map(|instance| {
                let invocation = Invocation {
                    instance,
                    query: Arc::clone(&query),
                    epoch,
                    tx: tx.clone(),
                    cancel: cancel.clone(),
                    timeout: self.timeout,
                    states: Arc::clone(&states),
                };
                tokio::spawn(invocation.run())
            })
            .collect();

        Dispatch {
            epoch,
            events: rx,
            states,
            remaining,
            handles,
        }
    }
}

/// Handle to one in-flight query fan-out.
#[derive(Debug)]
pub struct Dispatch {
    epoch: Epoch,
    events: mpsc::Receiver<DispatchEvent>,
    states: StateTable,
    remaining: usize,
    handles: Vec<JoinHandle<()>>,
}

impl Dispatch {
    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Next event, or `None` once every invocation has reported a terminal
    /// state.
    pub async fn next_event(&mut self) -> Option<DispatchEvent> {
        if self.remaining == 0 {
            return None;
        }
        let event = self.events.recv().await?;
        if matches!(event, DispatchEvent::Finished { .. }) {
            self.remaining -= 1;
        }
        Some(event)
    }

    /// Snapshot of every invocation's state
    #[must_use]
    pub fn states(&self) -> HashMap<String, InvocationState> {
        lock(&self.states).clone()
    }

    #[must_use]
    pub fn state(&self, plugin_id: &str) -> Option<InvocationState> {
        lock(&self.states).get(plugin_id).cloned()
    }

    /// Wait until every per-plugin task has returned.
    ///
    /// Cancelled plugins may still be running detached after this.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

fn lock(states: &StateTable) -> std::sync::MutexGuard<'_, HashMap<String, InvocationState>> {
    states.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Outcome {
    Completed(Vec<QueryResult>),
    TimedOut,
    Failed(String),
    Canceled,
}

struct Invocation {
    instance: Arc<PluginInstance>,
    query: Arc<Query>,
    epoch: Epoch,
    tx: mpsc::Sender<DispatchEvent>,
    cancel: CancellationToken,
    timeout: Duration,
    states: StateTable,
}

impl Invocation {
    async fn run(self) {
        let plugin_id = self.instance.id().to_string();

        if let Some(ms) = self.instance.metadata().debounce_ms() {
            debug!("[{}] Debouncing {}ms", plugin_id, ms);
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.finish(plugin_id, InvocationState::Canceled).await;
                    return;
                }
                () = tokio::time::sleep(Duration::from_millis(ms)) => {}
            }
        }

        self.set_state(&plugin_id, InvocationState::Running);

        let token = self.cancel.child_token();
        let sink = BatchSink::new(plugin_id.as_str(), self.epoch, self.tx.clone(), token.clone());
        let plugin = Arc::clone(self.instance.plugin());
        let query = Arc::clone(&self.query);
        let mut task = tokio::spawn(async move { plugin.query(&query, sink).await });

        let outcome = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Outcome::Canceled,
            joined = tokio::time::timeout(self.timeout, &mut task) => match joined {
                Err(_) => {
                    task.abort();
                    Outcome::TimedOut
                }
                Ok(Err(err)) if err.is_panic() => {
                    Outcome::Failed(format!("panicked: {}", panic_message(err.into_panic())))
                }
                Ok(Err(err)) => Outcome::Failed(err.to_string()),
                Ok(Ok(Err(err))) => Outcome::Failed(err.to_string()),
                Ok(Ok(Ok(results))) => Outcome::Completed(results),
            },
        };

        // Refuse late pushes from the plugin from here on
        token.cancel();

        let state = match outcome {
            Outcome::Canceled => {
                debug!("[{}] Canceled under epoch {}", plugin_id, self.epoch);
                self.finish(plugin_id, InvocationState::Canceled).await;
                return;
            }
            Outcome::Completed(results) => {
                debug!("[{}] Completed with {} result(s)", plugin_id, results.len());
                self.emit_batch(&plugin_id, results).await;
                InvocationState::Completed
            }
            Outcome::TimedOut => {
                warn!("[{}] Timed out after {:?}", plugin_id, self.timeout);
                self.emit_batch(&plugin_id, Vec::new()).await;
                InvocationState::TimedOut
            }
            Outcome::Failed(reason) => {
                warn!("[{}] Query failed: {}", plugin_id, reason);
                self.emit_batch(&plugin_id, Vec::new()).await;
                InvocationState::Failed(reason)
            }
        };

        self.finish(plugin_id, state).await;
    }

    fn set_state(&self, plugin_id: &str, state: InvocationState) {
        lock(&self.states).insert(plugin_id.to_string(), state);
    }

    /// Record the terminal state and report it.
    ///
    /// `Finished` is never dropped for a full queue: `Dispatch::next_event`
    /// counts these to know when to stop. The send only fails once the
    /// `Dispatch` is gone.
    async fn finish(&self, plugin_id: String, state: InvocationState) {
        self.set_state(&plugin_id, state.clone());
        if self
            .tx
            .send(DispatchEvent::Finished {
                plugin_id,
                epoch: self.epoch,
                state,
            })
            .await
            .is_err()
        {
            debug!("Dispatch for epoch {} dropped before finishing", self.epoch);
        }
    }

    /// Batches are dropped once the query is cancelled.
    async fn emit_batch(&self, plugin_id: &str, results: Vec<QueryResult>) {
        let event = DispatchEvent::Batch {
            plugin_id: plugin_id.to_string(),
            epoch: self.epoch,
            results: polish(plugin_id, results),
        };
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {}
            _ = self.tx.send(event) => {}
        }
    }
}

/// Stamp results with their plugin id and give id-less results a fresh one.
pub(crate) fn polish(plugin_id: &str, mut results: Vec<QueryResult>) -> Vec<QueryResult> {
    for result in &mut results {
        plugin_id.clone_into(&mut result.plugin_id);
        if result.id.is_empty() {
            result.id = uuid::Uuid::new_v4().to_string();
        }
    }
    results
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
