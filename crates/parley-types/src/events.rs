use serde::{Deserialize, Serialize};

use crate::models::{MediaKind, Message, PrivateChatSummary};

/// Events sent FROM server TO client over the WebSocket.
///
/// Serialized as a flat object tagged by `type`, e.g.
/// `{"type":"msg-read","id":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// The deployment has a password; the client must send `auth`.
    NeedPassword,

    AuthOk,

    /// Sent right before the server closes the connection.
    Error { code: ErrorCode, text: String },

    /// Full public history, sent in reply to `join`.
    History {
        messages: Vec<Message>,
        vapid_public_key: Option<String>,
    },

    /// Join/leave announcements.
    System { text: String },

    /// Current roster of joined users.
    Online { count: usize, users: Vec<String> },

    Typing { name: String, is_typing: bool },

    Message { message: Message },

    MsgRead { id: String },

    Edit { id: String, text: String },

    Delete { id: String },

    /// An image attachment passed its time-to-live. `chat_id` is set when the
    /// message lives in a private thread.
    ImageExpired {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chat_id: Option<String>,
    },

    /// A voice or file attachment passed its time-to-live.
    MediaExpired {
        id: String,
        kind: MediaKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chat_id: Option<String>,
    },

    PrivateOpened {
        chat_id: String,
        with: String,
        messages: Vec<Message>,
    },

    PrivateChatsList { chats: Vec<PrivateChatSummary> },

    PrivateMessage { chat_id: String, message: Message },

    PrivateMsgRead { chat_id: String, id: String },

    PrivateDelete { chat_id: String, id: String },
}

impl ServerEvent {
    /// Expiry announcement for one attachment kind.
    pub fn media_expired(id: String, kind: MediaKind, chat_id: Option<String>) -> Self {
        match kind {
            MediaKind::Image => Self::ImageExpired { id, chat_id },
            _ => Self::MediaExpired { id, kind, chat_id },
        }
    }
}

/// Codes carried by [`ServerEvent::Error`]. Both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    Full,
    WrongPassword,
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    Auth {
        #[serde(default)]
        password: String,
    },

    /// Pick a display name and receive history.
    Join {
        #[serde(default)]
        name: Option<String>,
    },

    Typing {
        #[serde(default)]
        is_typing: bool,
    },

    Message(MessageDraft),

    MarkRead { id: String },

    Edit {
        id: String,
        #[serde(default)]
        text: String,
    },

    Delete { id: String },

    /// Opaque push subscription descriptor, stored per display name.
    PushSubscribe { subscription: serde_json::Value },

    OpenPrivate {
        #[serde(default)]
        with: String,
    },

    GetPrivateChats,

    PrivateMessage(PrivateDraft),

    PrivateMarkRead { chat_id: String, id: String },

    PrivateDelete { chat_id: String, id: String },
}

/// Client-supplied fields of a new message. Media references come from the
/// upload endpoint and are validated when the message is composed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_mime: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateDraft {
    #[serde(default)]
    pub chat_id: String,
    #[serde(flatten)]
    pub draft: MessageDraft,
}
