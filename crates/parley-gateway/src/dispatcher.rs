use std::sync::Arc;
use std::time::Duration;

use parley_store::{
    MediaStore, MessageLog, SnapshotKey, SnapshotStore, Subscriptions, ThreadStore,
};
use parley_types::events::ServerEvent;
use parley_types::limits::MAX_CLIENTS;
use parley_types::models::Message;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::connection::HEARTBEAT_INTERVAL;
use crate::error::AdmitError;
use crate::persist::{self, Persister};
use crate::push::{Audience, PushError, PushPayload, PushTransport};
use crate::registry::{SessionId, SessionRegistry, SessionState};
use crate::router::Frame;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Shared secret. `None` opens the chat to everyone.
    pub password: Option<String>,
    /// Echoed to clients in the `history` event for push registration.
    pub vapid_public_key: Option<String>,
    /// Ping period; a connection that misses one pong is dropped.
    pub heartbeat: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            password: None,
            vapid_public_key: None,
            heartbeat: HEARTBEAT_INTERVAL,
        }
    }
}

/// External capabilities the gateway drives.
pub struct GatewayDeps {
    pub snapshots: Arc<dyn SnapshotStore>,
    pub media: Arc<dyn MediaStore>,
    pub push: Arc<dyn PushTransport>,
}

/// Shared chat state: the session registry, the public history, private
/// threads and push subscriptions.
///
/// Each structure has its own lock. When one operation needs several, they
/// are taken in this order: `history`, `threads`, `sessions`,
/// `subscriptions`. `history` and `threads` are never held together.
#[derive(Clone)]
pub struct Gateway {
    pub(crate) inner: Arc<GatewayInner>,
}

pub(crate) struct GatewayInner {
    pub(crate) config: GatewayConfig,
    pub(crate) history: Mutex<MessageLog>,
    pub(crate) threads: Mutex<ThreadStore>,
    pub(crate) sessions: RwLock<SessionRegistry>,
    pub(crate) subscriptions: Mutex<Subscriptions>,
    pub(crate) media: Arc<dyn MediaStore>,
    pub(crate) push: Arc<dyn PushTransport>,
    pub(crate) persister: Persister,
}

impl Gateway {
    /// Load every store from `deps.snapshots` and start the snapshot writer.
    /// Must be called from within a Tokio runtime.
    pub fn new(config: GatewayConfig, deps: GatewayDeps) -> Self {
        let history: MessageLog = persist::load(&*deps.snapshots, SnapshotKey::History);
        let threads: ThreadStore = persist::load(&*deps.snapshots, SnapshotKey::PrivateChats);
        let subscriptions: Subscriptions =
            persist::load(&*deps.snapshots, SnapshotKey::Subscriptions);
        persist::log_loaded(history.len(), threads.len(), subscriptions.len());

        Self {
            inner: Arc::new(GatewayInner {
                config,
                history: Mutex::new(history),
                threads: Mutex::new(threads),
                sessions: RwLock::new(SessionRegistry::new(MAX_CLIENTS)),
                subscriptions: Mutex::new(subscriptions),
                media: deps.media,
                push: deps.push,
                persister: Persister::spawn(deps.snapshots),
            }),
        }
    }

    /// Admit a new connection and greet it with `auth-ok` or
    /// `need-password`. Returns the session's outbound frame queue.
    pub async fn connect(&self) -> Result<(SessionId, mpsc::UnboundedReceiver<Frame>), AdmitError> {
        let open = self.inner.config.password.is_none();
        let mut sessions = self.inner.sessions.write().await;
        let (id, rx) = sessions.admit(open)?;

        let greeting = if open {
            ServerEvent::AuthOk
        } else {
            ServerEvent::NeedPassword
        };
        sessions.to_session(id, &greeting);
        debug!("Session {} admitted ({}/{})", id, sessions.len(), MAX_CLIENTS);
        Ok((id, rx))
    }

    /// Deregister a session. Joined sessions are announced as leaving and the
    /// roster is re-broadcast. Stored messages are untouched.
    pub async fn disconnect(&self, id: SessionId) {
        let mut sessions = self.inner.sessions.write().await;
        let Some(session) = sessions.remove(id) else {
            return;
        };

        if session.state == SessionState::Joined {
            info!("{} ({}) left", session.name, id);
            sessions.to_all(
                &ServerEvent::System {
                    text: format!("{} left the chat", session.name),
                },
                None,
            );
            sessions.broadcast_roster();
        }
    }

    /// Push `payload` to every subscriber in `audience` that has no live
    /// authenticated session. Subscriptions the transport reports as gone are
    /// dropped and the map is persisted.
    pub async fn notify_offline(&self, audience: Audience, payload: PushPayload) {
        let push = &self.inner.push;
        if !push.enabled() {
            return;
        }

        let online = self.inner.sessions.read().await.authenticated_names();
        let targets: Vec<_> = self
            .inner
            .subscriptions
            .lock()
            .await
            .entries()
            .into_iter()
            .filter(|(name, _)| audience.includes(name) && !online.contains(name))
            .collect();
        if targets.is_empty() {
            return;
        }

        let sends = targets.into_iter().map(|(name, subscription)| {
            let delivery = push.send(subscription, payload.clone());
            async move { (name, delivery.await) }
        });
        let results = futures_util::future::join_all(sends).await;

        let mut gone = Vec::new();
        for (name, result) in results {
            match result {
                Ok(()) => debug!("Push delivered to {}", name),
                Err(PushError::Gone) => gone.push(name),
                Err(e) => warn!("Push to {} failed: {}", name, e),
            }
        }

        if !gone.is_empty() {
            let mut subscriptions = self.inner.subscriptions.lock().await;
            for name in &gone {
                subscriptions.remove(name);
                info!("Dropped expired push subscription for {}", name);
            }
            self.inner
                .persister
                .save(SnapshotKey::Subscriptions, &*subscriptions);
        }
    }

    /// Fire-and-forget variant of [`Gateway::notify_offline`].
    pub(crate) fn spawn_notify(&self, audience: Audience, payload: PushPayload) {
        if !self.inner.push.enabled() {
            return;
        }
        let gateway = self.clone();
        tokio::spawn(async move { gateway.notify_offline(audience, payload).await });
    }

    /// Snapshot history and private threads.
    pub async fn checkpoint(&self) {
        {
            let history = self.inner.history.lock().await;
            self.inner.persister.save(SnapshotKey::History, &*history);
        }
        let threads = self.inner.threads.lock().await;
        self.inner.persister.save(SnapshotKey::PrivateChats, &*threads);
    }

    /// Snapshot every store and wait for the writes to finish.
    pub async fn save_all(&self) {
        self.checkpoint().await;
        {
            let subscriptions = self.inner.subscriptions.lock().await;
            self.inner
                .persister
                .save(SnapshotKey::Subscriptions, &*subscriptions);
        }
        self.inner.persister.flush().await;
    }

    /// Wait until every snapshot queued so far has been written.
    pub async fn flush(&self) {
        self.inner.persister.flush().await;
    }

    pub fn heartbeat(&self) -> Duration {
        self.inner.config.heartbeat
    }

    pub async fn history(&self) -> Vec<Message> {
        self.inner.history.lock().await.to_vec()
    }

    pub async fn thread(&self, key: &str) -> Option<Vec<Message>> {
        self.inner
            .threads
            .lock()
            .await
            .get(key)
            .map(|t| t.messages.to_vec())
    }

    pub async fn subscriptions(&self) -> Subscriptions {
        self.inner.subscriptions.lock().await.clone()
    }
}
