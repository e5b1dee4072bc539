//! Per-connection chat protocol.
//!
//! A session moves from `Connected` (waiting for `auth`) to `Authenticated`
//! and, after `join`, to `Joined`. Commands a session is not yet allowed to
//! send are dropped without a reply; so are commands that reference unknown
//! messages or touch messages the sender does not own.

use std::collections::HashSet;

use chrono::Local;
use parley_store::SnapshotKey;
use parley_store::threads::{resolve_thread, thread_key};
use parley_types::events::{ClientCommand, MessageDraft, PrivateDraft, ServerEvent};
use parley_types::limits::clamp_text;
use parley_types::models::Message;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dispatcher::Gateway;
use crate::push::{Audience, PushPayload, preview_body};
use crate::registry::{SessionId, SessionState};

/// What the connection driver should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop reading; queued frames are still delivered before the socket closes.
    Close,
}

impl Gateway {
    /// Parse and handle one inbound text frame. Unparseable payloads are
    /// logged and dropped; the connection stays open.
    pub async fn handle_text(&self, id: SessionId, text: &str) -> Flow {
        match serde_json::from_str::<ClientCommand>(text) {
            Ok(cmd) => self.handle(id, cmd).await,
            Err(e) => {
                let mut end = text.len().min(200);
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                warn!("Session {} bad command: {} -- raw: {}", id, e, &text[..end]);
                Flow::Continue
            }
        }
    }

    pub async fn handle(&self, id: SessionId, cmd: ClientCommand) -> Flow {
        let (state, name) = {
            let sessions = self.inner.sessions.read().await;
            match sessions.get(id) {
                Some(s) => (s.state, s.name.clone()),
                None => return Flow::Close,
            }
        };

        if state == SessionState::Connected {
            return match cmd {
                ClientCommand::Auth { password } => self.authenticate(id, &password).await,
                _ => Flow::Continue,
            };
        }

        match cmd {
            // A repeated auth after a successful one is ignored without a reply.
            ClientCommand::Auth { .. } => {}
            ClientCommand::Join { name } => self.join(id, name.as_deref()).await,
            ClientCommand::Typing { is_typing } => {
                if state == SessionState::Joined {
                    self.typing(id, name, is_typing).await;
                }
            }
            ClientCommand::Message(draft) => self.post_message(&name, &draft).await,
            ClientCommand::MarkRead { id: msg_id } => self.mark_read(&name, &msg_id).await,
            ClientCommand::Edit { id: msg_id, text } => self.edit(&name, &msg_id, &text).await,
            ClientCommand::Delete { id: msg_id } => self.delete(&name, &msg_id).await,
            ClientCommand::PushSubscribe { subscription } => {
                self.push_subscribe(&name, subscription).await
            }
            ClientCommand::OpenPrivate { with } => self.open_private(id, &name, &with).await,
            ClientCommand::GetPrivateChats => self.list_private_chats(id, &name).await,
            ClientCommand::PrivateMessage(draft) => self.post_private(&name, &draft).await,
            ClientCommand::PrivateMarkRead { chat_id, id: msg_id } => {
                self.private_mark_read(&name, &chat_id, &msg_id).await
            }
            ClientCommand::PrivateDelete { chat_id, id: msg_id } => {
                self.private_delete(&name, &chat_id, &msg_id).await
            }
        }
        Flow::Continue
    }

    async fn authenticate(&self, id: SessionId, supplied: &str) -> Flow {
        let mut sessions = self.inner.sessions.write().await;
        match sessions.authenticate(id, self.inner.config.password.as_deref(), supplied) {
            Ok(()) => {
                sessions.to_session(id, &ServerEvent::AuthOk);
                debug!("Session {} authenticated", id);
                Flow::Continue
            }
            Err(e) => {
                warn!("Session {} failed authentication", id);
                sessions.to_session(id, &e.to_event());
                Flow::Close
            }
        }
    }

    async fn join(&self, id: SessionId, raw_name: Option<&str>) {
        // Holding history while the session joins means no message can slip
        // between the snapshot and the session becoming a broadcast target.
        let history = self.inner.history.lock().await;
        let mut sessions = self.inner.sessions.write().await;
        let Some(name) = sessions.set_name(id, raw_name) else {
            return;
        };
        info!("{} ({}) joined", name, id);

        sessions.to_session(
            id,
            &ServerEvent::History {
                messages: history.to_vec(),
                vapid_public_key: self.inner.config.vapid_public_key.clone(),
            },
        );
        sessions.to_all(
            &ServerEvent::System {
                text: format!("{} joined the chat", name),
            },
            None,
        );
        sessions.broadcast_roster();
    }

    async fn typing(&self, id: SessionId, name: String, is_typing: bool) {
        let sessions = self.inner.sessions.read().await;
        sessions.to_all(&ServerEvent::Typing { name, is_typing }, Some(id));
    }

    async fn post_message(&self, author: &str, draft: &MessageDraft) {
        let Some(message) = Message::compose(draft, author, Local::now()) else {
            debug!("Dropping empty message from {}", author);
            return;
        };
        let body = preview_body(&message.text);

        {
            let mut history = self.inner.history.lock().await;
            history.push(message.clone());
            self.inner.persister.save(SnapshotKey::History, &*history);

            // the author gets it back too, with the final id, time and references
            let sessions = self.inner.sessions.read().await;
            sessions.to_all(&ServerEvent::Message { message }, None);
        }

        self.spawn_notify(
            Audience::AllExcept(HashSet::from([author.to_string()])),
            PushPayload {
                title: author.to_string(),
                body,
            },
        );
    }

    async fn mark_read(&self, reader: &str, msg_id: &str) {
        let mut history = self.inner.history.lock().await;
        let Some(message) = history.get_mut(msg_id) else {
            return;
        };
        if message.read || message.author == reader {
            return;
        }
        message.read = true;

        let sessions = self.inner.sessions.read().await;
        sessions.to_all(&ServerEvent::MsgRead { id: msg_id.to_string() }, None);
    }

    async fn edit(&self, editor: &str, msg_id: &str, text: &str) {
        let mut history = self.inner.history.lock().await;
        let Some(message) = history.get_mut(msg_id) else {
            return;
        };
        if message.author != editor {
            return;
        }
        message.text = clamp_text(text);
        message.edited = true;
        let event = ServerEvent::Edit {
            id: msg_id.to_string(),
            text: message.text.clone(),
        };
        self.inner.persister.save(SnapshotKey::History, &*history);

        let sessions = self.inner.sessions.read().await;
        sessions.to_all(&event, None);
    }

    async fn delete(&self, requester: &str, msg_id: &str) {
        let mut history = self.inner.history.lock().await;
        if history.get(msg_id).is_none_or(|m| m.author != requester) {
            return;
        }
        let Some(message) = history.remove(msg_id) else {
            return;
        };
        for reference in message.media_references() {
            self.inner.media.remove(reference);
        }
        self.inner.persister.save(SnapshotKey::History, &*history);

        let sessions = self.inner.sessions.read().await;
        sessions.to_all(&ServerEvent::Delete { id: msg_id.to_string() }, None);
    }

    async fn push_subscribe(&self, name: &str, descriptor: Value) {
        let mut subscriptions = self.inner.subscriptions.lock().await;
        subscriptions.upsert(name, descriptor);
        self.inner
            .persister
            .save(SnapshotKey::Subscriptions, &*subscriptions);
        debug!("Stored push subscription for {}", name);
    }

    async fn open_private(&self, id: SessionId, name: &str, with: &str) {
        let other = with.trim();
        if other.is_empty() || other == name {
            return;
        }
        let chat_id = thread_key(name, other);

        let mut threads = self.inner.threads.lock().await;
        let messages = threads.get_or_create(&chat_id).messages.to_vec();

        let sessions = self.inner.sessions.read().await;
        sessions.to_session(
            id,
            &ServerEvent::PrivateOpened {
                chat_id,
                with: other.to_string(),
                messages,
            },
        );
    }

    async fn list_private_chats(&self, id: SessionId, name: &str) {
        let chats = self.inner.threads.lock().await.summaries_for(name);
        let sessions = self.inner.sessions.read().await;
        sessions.to_session(id, &ServerEvent::PrivateChatsList { chats });
    }

    async fn post_private(&self, author: &str, private: &PrivateDraft) {
        let Some((chat_id, other)) = resolve_thread(&private.chat_id, author) else {
            return;
        };

        let Some(message) = Message::compose(&private.draft, author, Local::now()) else {
            debug!("Dropping empty private message from {}", author);
            return;
        };
        let body = format!("💬 {}", preview_body(&message.text));

        let other_online = {
            let mut threads = self.inner.threads.lock().await;
            threads.get_or_create(&chat_id).messages.push(message.clone());
            self.inner.persister.save(SnapshotKey::PrivateChats, &*threads);

            let sessions = self.inner.sessions.read().await;
            sessions.to_thread(
                &chat_id,
                &ServerEvent::PrivateMessage {
                    chat_id: chat_id.clone(),
                    message,
                },
            );
            sessions.is_online(other)
        };

        if !other_online {
            self.spawn_notify(
                Audience::Only(other.to_string()),
                PushPayload {
                    title: author.to_string(),
                    body,
                },
            );
        }
    }

    async fn private_mark_read(&self, reader: &str, chat_id: &str, msg_id: &str) {
        let Some((chat_id, _)) = resolve_thread(chat_id, reader) else {
            return;
        };
        let mut threads = self.inner.threads.lock().await;
        let Some(message) = threads
            .get_mut(&chat_id)
            .and_then(|t| t.messages.get_mut(msg_id))
        else {
            return;
        };
        if message.read || message.author == reader {
            return;
        }
        message.read = true;

        let sessions = self.inner.sessions.read().await;
        sessions.to_thread(
            &chat_id,
            &ServerEvent::PrivateMsgRead {
                chat_id: chat_id.clone(),
                id: msg_id.to_string(),
            },
        );
    }

    async fn private_delete(&self, requester: &str, chat_id: &str, msg_id: &str) {
        let Some((chat_id, _)) = resolve_thread(chat_id, requester) else {
            return;
        };
        let mut threads = self.inner.threads.lock().await;
        let Some(thread) = threads.get_mut(&chat_id) else {
            return;
        };
        if thread.messages.get(msg_id).is_none_or(|m| m.author != requester) {
            return;
        }
        let Some(message) = thread.messages.remove(msg_id) else {
            return;
        };
        for reference in message.media_references() {
            self.inner.media.remove(reference);
        }
        self.inner.persister.save(SnapshotKey::PrivateChats, &*threads);

        let sessions = self.inner.sessions.read().await;
        sessions.to_thread(
            &chat_id,
            &ServerEvent::PrivateDelete {
                chat_id: chat_id.clone(),
                id: msg_id.to_string(),
            },
        );
    }
}
