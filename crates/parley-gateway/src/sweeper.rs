use std::time::Duration;

use parley_store::{MediaStore, SnapshotKey};
use parley_types::events::ServerEvent;
use parley_types::limits::MEDIA_TTL;
use parley_types::models::Message;
use tracing::{info, warn};

use crate::dispatcher::Gateway;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Strip attachments older than [`MEDIA_TTL`] every `period`.
pub async fn run_sweeper(gateway: Gateway, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;

    loop {
        interval.tick().await;
        let expired = gateway.sweep(chrono::Utc::now().timestamp_millis()).await;
        if expired > 0 {
            info!("Sweep: expired {} attachments", expired);
        }
    }
}

impl Gateway {
    /// Expire every attachment older than the TTL as of `now_ms`. Public
    /// expiries are announced to everyone, thread expiries to the thread's
    /// participants. Each store that changed is persisted once.
    /// Returns the number of attachments expired.
    pub async fn sweep(&self, now_ms: i64) -> usize {
        let ttl_ms = i64::try_from(MEDIA_TTL.as_millis()).unwrap_or(i64::MAX);
        let media = &*self.inner.media;
        let mut total = 0;

        {
            let mut history = self.inner.history.lock().await;
            let events = expire_due(history.iter_mut(), now_ms, ttl_ms, media, None);
            if !events.is_empty() {
                total += events.len();
                self.inner.persister.save(SnapshotKey::History, &*history);
                let sessions = self.inner.sessions.read().await;
                for event in &events {
                    sessions.to_all(event, None);
                }
            }
        }

        let mut threads = self.inner.threads.lock().await;
        let mut changed = false;
        {
            let sessions = self.inner.sessions.read().await;
            for (key, thread) in threads.iter_mut() {
                let events = expire_due(
                    thread.messages.iter_mut(),
                    now_ms,
                    ttl_ms,
                    media,
                    Some(key),
                );
                for event in &events {
                    sessions.to_thread(key, event);
                }
                changed |= !events.is_empty();
                total += events.len();
            }
        }
        if changed {
            self.inner.persister.save(SnapshotKey::PrivateChats, &*threads);
        }

        total
    }
}

fn expire_due<'a>(
    messages: impl Iterator<Item = &'a mut Message>,
    now_ms: i64,
    ttl_ms: i64,
    media: &dyn MediaStore,
    chat_id: Option<&String>,
) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    for message in messages {
        for attachment in message.attachments.iter_mut() {
            if !attachment.is_due(now_ms, ttl_ms) {
                continue;
            }
            match attachment.expire() {
                Some(reference) => media.remove(&reference),
                None => warn!("Attachment on {} had no reference", message.id),
            }
            events.push(ServerEvent::media_expired(
                message.id.clone(),
                attachment.kind,
                chat_id.cloned(),
            ));
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use parley_types::events::{ClientCommand, PrivateDraft};
    use parley_types::models::MediaKind;

    use super::*;
    use crate::testing::{Harness, draft};

    const HOUR_MS: i64 = 60 * 60 * 1000;

    #[tokio::test]
    async fn expired_image_is_stripped_and_announced_once() {
        let h = Harness::new(None);
        let mut alice = h.joined("Alice").await;
        let mut bob = h.joined("Bob").await;

        let mut image = draft("look");
        image.image_url = Some("/uploads/cat.png".into());
        alice.send(&h.gateway, ClientCommand::Message(image)).await;
        alice.say(&h.gateway, "plain").await;
        let id = h.gateway.history().await[0].id.clone();
        let sent_at = h.gateway.history().await[0]
            .attachment(MediaKind::Image)
            .unwrap()
            .attached_at;
        alice.drain();
        bob.drain();

        // not due yet
        assert_eq!(h.gateway.sweep(sent_at + HOUR_MS).await, 0);
        assert!(bob.drain().is_empty());

        assert_eq!(h.gateway.sweep(sent_at + 7 * HOUR_MS).await, 1);
        assert_eq!(bob.drain(), vec![ServerEvent::ImageExpired {
            id: id.clone(),
            chat_id: None
        }]);
        assert_eq!(alice.drain().len(), 1);

        let message = h.gateway.history().await.remove(0);
        let attachment = message.attachment(MediaKind::Image).unwrap();
        assert!(attachment.expired);
        assert!(attachment.url.is_none());
        assert_eq!(h.media.removed(), vec!["/uploads/cat.png"]);

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["imageExpired"], true);
        assert!(json.get("imageUrl").is_none());

        // a second pass finds nothing left to do
        assert_eq!(h.gateway.sweep(sent_at + 8 * HOUR_MS).await, 0);
        assert!(bob.drain().is_empty());

        h.gateway.flush().await;
        // one save for each post, one for the sweep
        assert_eq!(h.snapshots.save_count(SnapshotKey::History), 3);
    }

    #[tokio::test]
    async fn thread_expiry_goes_to_participants_only() {
        let h = Harness::new(None);
        let alice = h.joined("Alice").await;
        let mut bob = h.joined("Bob").await;
        let mut carol = h.joined("Carol").await;

        let mut voice = draft("");
        voice.voice_url = Some("/uploads/note.webm".into());
        let mut file = draft("");
        file.file_url = Some("/uploads/doc.pdf".into());
        for d in [voice, file] {
            alice
                .send(
                    &h.gateway,
                    ClientCommand::PrivateMessage(PrivateDraft {
                        chat_id: "Alice|Bob".into(),
                        draft: d,
                    }),
                )
                .await;
        }
        let thread = h.gateway.thread("Alice|Bob").await.unwrap();
        let sent_at = thread[0].attachments[0].attached_at;
        bob.drain();
        carol.drain();

        assert_eq!(h.gateway.sweep(sent_at + 7 * HOUR_MS).await, 2);

        let events = bob.drain();
        assert_eq!(events, vec![
            ServerEvent::MediaExpired {
                id: thread[0].id.clone(),
                kind: MediaKind::Voice,
                chat_id: Some("Alice|Bob".into()),
            },
            ServerEvent::MediaExpired {
                id: thread[1].id.clone(),
                kind: MediaKind::File,
                chat_id: Some("Alice|Bob".into()),
            },
        ]);
        assert!(carol.drain().is_empty());

        h.gateway.flush().await;
        // two posts plus a single save for the whole pass
        assert_eq!(h.snapshots.save_count(SnapshotKey::PrivateChats), 3);
        assert_eq!(h.snapshots.save_count(SnapshotKey::History), 0);
    }
}
