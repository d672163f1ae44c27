use super::DispatchEvent;
use kestrel_types::{Epoch, QueryResult};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Channel a plugin streams result batches through during one invocation.
///
/// Every push replaces the plugin's previous batch for the same query. Once
/// the invocation ends, times out or is superseded, pushes are refused.
#[derive(Debug, Clone)]
pub struct BatchSink {
    plugin_id: Arc<str>,
    epoch: Epoch,
    tx: mpsc::Sender<DispatchEvent>,
    token: CancellationToken,
}

impl BatchSink {
    #[must_use]
    pub fn new(
        plugin_id: impl Into<Arc<str>>,
        epoch: Epoch,
        tx: mpsc::Sender<DispatchEvent>,
        token: CancellationToken,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            epoch,
            tx,
            token,
        }
    }

    #[must_use]
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// True once the invocation no longer accepts results
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves when the invocation is cancelled or torn down
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Send a batch. Returns `false` if it was refused.
    pub async fn push(&self, results: Vec<QueryResult>) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let event = DispatchEvent::Batch {
            plugin_id: self.plugin_id.to_string(),
            epoch: self.epoch,
            results: super::polish(&self.plugin_id, results),
        };
        tokio::select! {
            biased;
            () = self.token.cancelled() => false,
            sent = self.tx.send(event) => sent.is_ok(),
        }
    }
}
