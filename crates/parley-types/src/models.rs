use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::MessageDraft;
use crate::limits::{
    DEFAULT_FILE_MIME, DEFAULT_FILE_NAME, MAX_FILE_NAME_LEN, UPLOAD_PREFIX, clamp_text,
    truncate_chars,
};

/// The three attachment slots a message can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Voice,
    File,
}

/// A media reference attached to a message.
///
/// `url` is `None` once the attachment has expired; `attached_at` is kept so
/// clients can still show when the media was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub kind: MediaKind,
    pub url: Option<String>,
    /// Unix milliseconds.
    pub attached_at: i64,
    pub expired: bool,
    /// File-kind only.
    pub file_name: Option<String>,
    /// File-kind only.
    pub file_mime: Option<String>,
}

impl Attachment {
    /// True if the reference is still live and older than `ttl_ms`.
    pub fn is_due(&self, now_ms: i64, ttl_ms: i64) -> bool {
        self.url.is_some() && !self.expired && now_ms - self.attached_at > ttl_ms
    }

    /// Mark expired and hand back the stripped reference.
    pub fn expire(&mut self) -> Option<String> {
        self.expired = true;
        self.url.take()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "MessageRepr", into = "MessageRepr")]
pub struct Message {
    pub id: String,
    pub author: String,
    pub text: String,
    /// Server-formatted wall clock time (`HH:MM`).
    pub time: String,
    pub read: bool,
    pub edited: bool,
    pub reply_to: Option<String>,
    /// At most one per kind, ordered image, voice, file.
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Build a message from a client draft. Returns `None` if the result would
    /// carry neither text nor a valid attachment reference.
    pub fn compose(draft: &MessageDraft, author: &str, now: DateTime<Local>) -> Option<Self> {
        let text = clamp_text(draft.text.as_deref().unwrap_or_default());
        let attached_at = now.timestamp_millis();

        let mut attachments = Vec::new();
        if let Some(url) = upload_reference(draft.image_url.as_deref()) {
            attachments.push(Attachment::new(MediaKind::Image, url, attached_at));
        }
        if let Some(url) = upload_reference(draft.voice_url.as_deref()) {
            attachments.push(Attachment::new(MediaKind::Voice, url, attached_at));
        }
        if let Some(url) = upload_reference(draft.file_url.as_deref()) {
            let mut file = Attachment::new(MediaKind::File, url, attached_at);
            let name = draft.file_name.as_deref().filter(|n| !n.is_empty());
            file.file_name = Some(
                truncate_chars(name.unwrap_or(DEFAULT_FILE_NAME), MAX_FILE_NAME_LEN).to_string(),
            );
            file.file_mime = Some(
                draft
                    .file_mime
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_FILE_MIME.to_string()),
            );
            attachments.push(file);
        }

        if text.is_empty() && attachments.is_empty() {
            return None;
        }

        let id = draft
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        Some(Self {
            id,
            author: author.to_string(),
            text,
            time: now.format("%H:%M").to_string(),
            read: false,
            edited: false,
            reply_to: draft.reply_to.clone().filter(|r| !r.is_empty()),
            attachments,
        })
    }

    pub fn attachment(&self, kind: MediaKind) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.kind == kind)
    }

    /// True if the attachment of `kind` still has a live reference.
    pub fn has_media(&self, kind: MediaKind) -> bool {
        self.attachment(kind).is_some_and(|a| a.url.is_some())
    }

    /// Live references held by this message, one per attachment.
    pub fn media_references(&self) -> impl Iterator<Item = &str> {
        self.attachments.iter().filter_map(|a| a.url.as_deref())
    }
}

impl Attachment {
    fn new(kind: MediaKind, url: String, attached_at: i64) -> Self {
        Self {
            kind,
            url: Some(url),
            attached_at,
            expired: false,
            file_name: None,
            file_mime: None,
        }
    }
}

fn upload_reference(raw: Option<&str>) -> Option<String> {
    raw.filter(|url| url.starts_with(UPLOAD_PREFIX))
        .map(str::to_string)
}

/// One entry of the `private-chats-list` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateChatSummary {
    pub chat_id: String,
    pub with: String,
    pub last_message: Option<MessagePreview>,
    pub message_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePreview {
    pub text: String,
    pub time: String,
    pub name: String,
    pub has_image: bool,
    pub has_voice: bool,
    pub has_file: bool,
}

impl From<&Message> for MessagePreview {
    fn from(msg: &Message) -> Self {
        Self {
            text: msg.text.clone(),
            time: msg.time.clone(),
            name: msg.author.clone(),
            has_image: msg.has_media(MediaKind::Image),
            has_voice: msg.has_media(MediaKind::Voice),
            has_file: msg.has_media(MediaKind::File),
        }
    }
}

// -- Wire representation --
//
// Clients (and snapshots written by earlier deployments) use one flat object
// with per-kind `imageUrl` / `imageTimestamp` / `imageExpired` fields.

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRepr {
    id: String,
    name: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    time: String,
    #[serde(default)]
    read: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    edited: bool,
    #[serde(default)]
    reply_to: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "is_false")]
    image_expired: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    voice_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    voice_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "is_false")]
    voice_expired: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "is_false")]
    file_expired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_mime: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn slot(kind: MediaKind, url: Option<String>, ts: Option<i64>, expired: bool) -> Option<Attachment> {
    if url.is_none() && !expired {
        return None;
    }
    Some(Attachment {
        kind,
        url: if expired { None } else { url },
        attached_at: ts.unwrap_or_default(),
        expired,
        file_name: None,
        file_mime: None,
    })
}

impl From<MessageRepr> for Message {
    fn from(r: MessageRepr) -> Self {
        let mut attachments = Vec::new();
        attachments.extend(slot(MediaKind::Image, r.image_url, r.image_timestamp, r.image_expired));
        attachments.extend(slot(MediaKind::Voice, r.voice_url, r.voice_timestamp, r.voice_expired));
        if let Some(mut file) = slot(MediaKind::File, r.file_url, r.file_timestamp, r.file_expired) {
            file.file_name = r.file_name;
            file.file_mime = r.file_mime;
            attachments.push(file);
        }

        Self {
            id: r.id,
            author: r.name,
            text: r.text,
            time: r.time,
            read: r.read,
            edited: r.edited,
            reply_to: r.reply_to,
            attachments,
        }
    }
}

impl From<Message> for MessageRepr {
    fn from(m: Message) -> Self {
        let mut r = MessageRepr {
            id: m.id,
            name: m.author,
            text: m.text,
            time: m.time,
            read: m.read,
            edited: m.edited,
            reply_to: m.reply_to,
            image_url: None,
            image_timestamp: None,
            image_expired: false,
            voice_url: None,
            voice_timestamp: None,
            voice_expired: false,
            file_url: None,
            file_timestamp: None,
            file_expired: false,
            file_name: None,
            file_mime: None,
        };

        for a in m.attachments {
            match a.kind {
                MediaKind::Image => {
                    r.image_url = a.url;
                    r.image_timestamp = Some(a.attached_at);
                    r.image_expired = a.expired;
                }
                MediaKind::Voice => {
                    r.voice_url = a.url;
                    r.voice_timestamp = Some(a.attached_at);
                    r.voice_expired = a.expired;
                }
                MediaKind::File => {
                    r.file_url = a.url;
                    r.file_timestamp = Some(a.attached_at);
                    r.file_expired = a.expired;
                    r.file_name = a.file_name;
                    r.file_mime = a.file_mime;
                }
            }
        }
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap()
    }

    fn draft(text: &str) -> MessageDraft {
        MessageDraft {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn compose_trims_text_and_stamps_time() {
        let msg = Message::compose(&draft("  hi  "), "Alice", at_noon()).unwrap();
        assert_eq!(msg.text, "hi");
        assert_eq!(msg.author, "Alice");
        assert_eq!(msg.time, "12:05");
        assert!(!msg.id.is_empty());
        assert!(!msg.read && !msg.edited);
    }

    #[test]
    fn compose_keeps_client_id() {
        let mut d = draft("x");
        d.id = Some("client-1".into());
        assert_eq!(Message::compose(&d, "A", at_noon()).unwrap().id, "client-1");
    }

    #[test]
    fn empty_message_is_never_built() {
        assert!(Message::compose(&draft("   "), "A", at_noon()).is_none());

        // references outside the upload prefix do not count
        let mut d = draft("");
        d.image_url = Some("https://elsewhere/cat.png".into());
        assert!(Message::compose(&d, "A", at_noon()).is_none());
    }

    #[test]
    fn attachment_only_message_is_allowed() {
        let mut d = draft("");
        d.file_url = Some("/uploads/report.pdf".into());
        let msg = Message::compose(&d, "A", at_noon()).unwrap();
        let file = msg.attachment(MediaKind::File).unwrap();
        assert_eq!(file.file_name.as_deref(), Some(DEFAULT_FILE_NAME));
        assert_eq!(file.file_mime.as_deref(), Some(DEFAULT_FILE_MIME));
        assert_eq!(file.attached_at, at_noon().timestamp_millis());
    }

    #[test]
    fn wire_format_is_flat() {
        let mut d = draft("look");
        d.image_url = Some("/uploads/a.png".into());
        d.reply_to = Some("m0".into());
        let msg = Message::compose(&d, "Alice", at_noon()).unwrap();

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["name"], "Alice");
        assert_eq!(json["imageUrl"], "/uploads/a.png");
        assert_eq!(json["replyTo"], "m0");
        assert!(json.get("voiceUrl").is_none());
        assert!(json.get("imageExpired").is_none());

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn expired_attachment_survives_serialization() {
        let mut d = draft("");
        d.voice_url = Some("/uploads/v.ogg".into());
        let mut msg = Message::compose(&d, "A", at_noon()).unwrap();
        let stripped = msg.attachments[0].expire();
        assert_eq!(stripped.as_deref(), Some("/uploads/v.ogg"));

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["voiceExpired"], true);
        assert!(json.get("voiceUrl").is_none());

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
        assert!(!back.has_media(MediaKind::Voice));
    }
}
