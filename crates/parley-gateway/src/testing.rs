//! Fakes and helpers shared by the gateway's unit tests.

use std::sync::{Arc, Mutex};

use futures_util::future::{self, BoxFuture};
use parley_store::{MediaStore, MemorySnapshots};
use parley_types::events::{ClientCommand, MessageDraft, ServerEvent};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::dispatcher::{Gateway, GatewayConfig, GatewayDeps};
use crate::push::{PushError, PushPayload, PushTransport};
use crate::registry::SessionId;
use crate::router::Frame;

#[derive(Default)]
pub struct RecordingMedia {
    pub removed: Mutex<Vec<String>>,
}

impl RecordingMedia {
    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

impl MediaStore for RecordingMedia {
    fn remove(&self, reference: &str) {
        self.removed.lock().unwrap().push(reference.to_string());
    }
}

/// Records every push; subscriptions whose descriptor is `"gone"` are
/// reported as permanently invalid.
#[derive(Default)]
pub struct RecordingPush {
    pub sent: Mutex<Vec<(Value, PushPayload)>>,
}

impl RecordingPush {
    pub fn sent(&self) -> Vec<(Value, PushPayload)> {
        self.sent.lock().unwrap().clone()
    }
}

impl PushTransport for RecordingPush {
    fn send(&self, subscription: Value, payload: PushPayload) -> BoxFuture<'static, Result<(), PushError>> {
        let gone = subscription == Value::from("gone");
        self.sent.lock().unwrap().push((subscription, payload));
        Box::pin(future::ready(if gone { Err(PushError::Gone) } else { Ok(()) }))
    }
}

pub struct Harness {
    pub gateway: Gateway,
    pub password: Option<String>,
    pub media: Arc<RecordingMedia>,
    pub snapshots: Arc<MemorySnapshots>,
    pub push: Arc<RecordingPush>,
}

impl Harness {
    pub fn new(password: Option<&str>) -> Self {
        Self::with_snapshots(password, Arc::new(MemorySnapshots::new()))
    }

    pub fn with_snapshots(password: Option<&str>, snapshots: Arc<MemorySnapshots>) -> Self {
        let media = Arc::new(RecordingMedia::default());
        let push = Arc::new(RecordingPush::default());
        let gateway = Gateway::new(
            GatewayConfig {
                password: password.map(str::to_string),
                vapid_public_key: Some("vapid-pub".into()),
                ..Default::default()
            },
            GatewayDeps {
                snapshots: snapshots.clone(),
                media: media.clone(),
                push: push.clone(),
            },
        );
        Self {
            gateway,
            password: password.map(str::to_string),
            media,
            snapshots,
            push,
        }
    }

    pub async fn connect(&self) -> Client {
        let (id, rx) = self.gateway.connect().await.unwrap();
        Client { id, rx }
    }

    /// Connect, authenticate, join as `name` and discard the join traffic.
    pub async fn joined(&self, name: &str) -> Client {
        let mut client = self.connect().await;
        client
            .send(&self.gateway, ClientCommand::Auth {
                password: self.password.clone().unwrap_or_default(),
            })
            .await;
        client
            .send(&self.gateway, ClientCommand::Join {
                name: Some(name.to_string()),
            })
            .await;
        client.drain();
        client
    }
}

pub struct Client {
    pub id: SessionId,
    pub rx: UnboundedReceiver<Frame>,
}

impl Client {
    pub async fn send(&self, gateway: &Gateway, cmd: ClientCommand) -> crate::Flow {
        gateway.handle(self.id, cmd).await
    }

    pub async fn say(&self, gateway: &Gateway, text: &str) {
        self.send(gateway, ClientCommand::Message(draft(text))).await;
    }

    /// Every event queued for this client so far.
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            events.push(serde_json::from_str(&frame).unwrap());
        }
        events
    }
}

pub fn draft(text: &str) -> MessageDraft {
    MessageDraft {
        text: Some(text.to_string()),
        ..Default::default()
    }
}

/// The only message carried by a set of events, if exactly one.
pub fn only_message(events: &[ServerEvent]) -> Option<&parley_types::models::Message> {
    let mut found = events.iter().filter_map(|e| match e {
        ServerEvent::Message { message } => Some(message),
        _ => None,
    });
    let first = found.next()?;
    found.next().is_none().then_some(first)
}
