//! Offline push notifications.
//!
//! The gateway decides who should be notified; a [`PushTransport`] does the
//! actual delivery against an opaque subscription descriptor.

use std::collections::HashSet;
use std::time::Duration;

use futures_util::future::{self, BoxFuture};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum PushError {
    /// The subscription is permanently invalid and should be forgotten.
    #[error("subscription is gone")]
    Gone,
    #[error("push relay rejected the notification ({0})")]
    Rejected(u16),
    #[error("push transport error: {0}")]
    Transport(String),
}

pub trait PushTransport: Send + Sync + 'static {
    fn send(&self, subscription: Value, payload: PushPayload) -> BoxFuture<'static, Result<(), PushError>>;

    /// False when push is not configured; the gateway then skips recipient
    /// selection entirely.
    fn enabled(&self) -> bool {
        true
    }
}

/// Used when no push relay is configured.
pub struct DisabledPush;

impl PushTransport for DisabledPush {
    fn send(&self, _: Value, _: PushPayload) -> BoxFuture<'static, Result<(), PushError>> {
        Box::pin(future::ready(Ok(())))
    }

    fn enabled(&self) -> bool {
        false
    }
}

/// Forwards `{subscription, payload}` as JSON to an HTTP push relay that
/// owns the VAPID keys. The relay answers 404/410 for dead subscriptions.
pub struct WebhookPush {
    client: reqwest::Client,
    url: String,
}

impl WebhookPush {
    pub fn new(url: String) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PushError::Transport(e.to_string()))?;
        Ok(Self { client, url })
    }
}

impl PushTransport for WebhookPush {
    fn send(&self, subscription: Value, payload: PushPayload) -> BoxFuture<'static, Result<(), PushError>> {
        let request = self.client.post(&self.url).json(&serde_json::json!({
            "subscription": subscription,
            "payload": payload,
        }));

        Box::pin(async move {
            let response = request
                .send()
                .await
                .map_err(|e| PushError::Transport(e.to_string()))?;
            match response.status() {
                s if s.is_success() => Ok(()),
                StatusCode::NOT_FOUND | StatusCode::GONE => Err(PushError::Gone),
                s => Err(PushError::Rejected(s.as_u16())),
            }
        })
    }
}

/// Who a notification is meant for, before online users are filtered out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every subscriber except these names.
    AllExcept(HashSet<String>),
    /// A single subscriber.
    Only(String),
}

impl Audience {
    pub fn includes(&self, name: &str) -> bool {
        match self {
            Audience::AllExcept(excluded) => !excluded.contains(name),
            Audience::Only(target) => target == name,
        }
    }
}

/// Body shown for a message that may carry only attachments.
pub fn preview_body(text: &str) -> String {
    if text.is_empty() {
        "📎 Attachment".to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_filters() {
        let all = Audience::AllExcept(HashSet::from(["Alice".to_string()]));
        assert!(!all.includes("Alice"));
        assert!(all.includes("Bob"));

        let one = Audience::Only("Bob".into());
        assert!(one.includes("Bob"));
        assert!(!one.includes("Carol"));
    }

    #[test]
    fn empty_text_gets_attachment_body() {
        assert_eq!(preview_body(""), "📎 Attachment");
        assert_eq!(preview_body("hi"), "hi");
    }

    #[tokio::test]
    async fn disabled_push_is_inert() {
        let push = DisabledPush;
        assert!(!push.enabled());
        let payload = PushPayload {
            title: "t".into(),
            body: "b".into(),
        };
        assert!(push.send(Value::Null, payload).await.is_ok());
    }
}
