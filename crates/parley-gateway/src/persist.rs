use std::sync::Arc;
use std::time::Duration;

use parley_store::{SnapshotKey, SnapshotStore};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::dispatcher::Gateway;

/// Periodic checkpoint of the message stores.
pub const SAVE_INTERVAL: Duration = Duration::from_secs(10);

enum Job {
    Save(SnapshotKey, String),
    Flush(oneshot::Sender<()>),
}

/// Hands snapshots to a single writer task, so writes leave the critical
/// path and land in the order they were taken.
#[derive(Clone)]
pub struct Persister {
    tx: mpsc::UnboundedSender<Job>,
}

impl Persister {
    pub fn spawn(store: Arc<dyn SnapshotStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(store, rx));
        Self { tx }
    }

    /// Serialize `value` now (callers hold the store's lock) and queue the write.
    pub fn save<T: Serialize + ?Sized>(&self, key: SnapshotKey, value: &T) {
        match serde_json::to_string(value) {
            Ok(body) => {
                if self.tx.send(Job::Save(key, body)).is_err() {
                    warn!("Snapshot writer stopped, dropping {} snapshot", key.as_str());
                }
            }
            Err(e) => error!("Failed to serialize {} snapshot: {}", key.as_str(), e),
        }
    }

    /// Wait until every write queued so far has been attempted.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Job::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run_writer(store: Arc<dyn SnapshotStore>, mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Save(key, body) => {
                let store = store.clone();
                let len = body.len();
                match tokio::task::spawn_blocking(move || store.save(key, &body)).await {
                    Ok(Ok(())) => debug!("Saved {} snapshot ({} bytes)", key.as_str(), len),
                    Ok(Err(e)) => error!("Failed to save {} snapshot: {}", key.as_str(), e),
                    Err(e) => error!("spawn_blocking join error: {}", e),
                }
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

/// Load one store at startup. A missing or unreadable snapshot yields an
/// empty store.
pub fn load<T: DeserializeOwned + Default>(store: &dyn SnapshotStore, key: SnapshotKey) -> T {
    let body = match store.load(key) {
        Ok(Some(body)) => body,
        Ok(None) => return T::default(),
        Err(e) => {
            warn!("Failed to read {} snapshot: {}", key.as_str(), e);
            return T::default();
        }
    };
    match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!("Corrupt {} snapshot, starting empty: {}", key.as_str(), e);
            T::default()
        }
    }
}

/// Checkpoint history and private threads every `period`.
pub async fn run_autosave(gateway: Gateway, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;

    loop {
        interval.tick().await;
        gateway.checkpoint().await;
    }
}

pub(crate) fn log_loaded(history: usize, threads: usize, subscriptions: usize) {
    info!(
        "Loaded {} messages, {} private chats, {} push subscriptions",
        history, threads, subscriptions
    );
}
