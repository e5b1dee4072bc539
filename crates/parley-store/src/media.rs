use std::path::{Path, PathBuf};

use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use parley_types::limits::UPLOAD_PREFIX;
use rand::Rng;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("not a base64 data URL")]
    Malformed,
    #[error("invalid base64 payload: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("failed to write upload: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// True if the client sent something unusable, as opposed to a storage failure.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, UploadError::Io(_))
    }
}

/// Removes the bytes behind upload references.
///
/// Removal is best-effort: implementations swallow and log their own
/// failures, and must not block the caller.
pub trait MediaStore: Send + Sync + 'static {
    fn remove(&self, reference: &str);
}

/// Uploads kept as flat files under one directory, addressed by
/// `/uploads/{file_name}` references.
#[derive(Debug, Clone)]
pub struct DiskMedia {
    dir: PathBuf,
}

const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
    ("audio/ogg", "ogg"),
    ("audio/webm", "webm"),
    ("audio/mpeg", "mp3"),
    ("audio/mp4", "m4a"),
    ("audio/wav", "wav"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("video/quicktime", "mov"),
    ("application/pdf", "pdf"),
    ("application/msword", "doc"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "docx",
    ),
    ("application/zip", "zip"),
    ("text/plain", "txt"),
];

const SUFFIX_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

impl DiskMedia {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Upload directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// On-disk path for a reference. Only the final path component is used,
    /// so a reference can never point outside the upload directory.
    pub fn path_for(&self, reference: &str) -> Option<PathBuf> {
        let name = reference.strip_prefix(UPLOAD_PREFIX)?.rsplit('/').next()?;
        if name.is_empty() || name == "." || name == ".." {
            return None;
        }
        Some(self.dir.join(name))
    }

    /// Decode a `data:<mime>;base64,<payload>` URL and store it.
    /// Returns the new reference.
    pub async fn save_data_url(&self, data_url: &str, prefix: &str) -> Result<String, UploadError> {
        let (mime, payload) = parse_data_url(data_url).ok_or(UploadError::Malformed)?;
        let bytes = B64.decode(payload)?;

        let file_name = format!(
            "{}-{}-{}.{}",
            sanitize_prefix(prefix),
            chrono::Utc::now().timestamp_millis(),
            random_suffix(),
            extension_for(mime)
        );
        fs::write(self.dir.join(&file_name), &bytes).await?;
        debug!("Stored upload {} ({} bytes, {})", file_name, bytes.len(), mime);

        Ok(format!("{}{}", UPLOAD_PREFIX, file_name))
    }
}

impl MediaStore for DiskMedia {
    fn remove(&self, reference: &str) {
        let Some(path) = self.path_for(reference) else {
            warn!("Ignoring delete of invalid upload reference {}", reference);
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = delete_path(&path).await {
                warn!("Failed to delete {}: {}", path.display(), e);
            }
        });
    }
}

async fn delete_path(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => {
            info!("Deleted upload {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Upload {} already gone", path.display());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn parse_data_url(data_url: &str) -> Option<(&str, &str)> {
    let (mime, payload) = data_url.strip_prefix("data:")?.split_once(";base64,")?;
    if mime.is_empty() || mime.contains(';') || payload.is_empty() {
        return None;
    }
    Some((mime, payload))
}

fn extension_for(mime: &str) -> String {
    if let Some((_, ext)) = MIME_EXTENSIONS.iter().find(|(m, _)| *m == mime) {
        return ext.to_string();
    }
    let subtype: String = mime
        .split('/')
        .nth(1)
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect();
    if subtype.is_empty() {
        "bin".to_string()
    } else {
        subtype
    }
}

fn sanitize_prefix(prefix: &str) -> String {
    let clean: String = prefix
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(32)
        .collect();
    if clean.is_empty() {
        "file".to_string()
    } else {
        clean
    }
}

fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..5)
        .map(|_| SUFFIX_CHARS[rng.random_range(0..SUFFIX_CHARS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("parley-media-{}-{}", tag, std::process::id()))
    }

    #[test]
    fn data_url_parsing() {
        assert_eq!(
            parse_data_url("data:image/png;base64,AAAA"),
            Some(("image/png", "AAAA"))
        );
        assert!(parse_data_url("image/png;base64,AAAA").is_none());
        assert!(parse_data_url("data:image/png;base64,").is_none());
        assert!(parse_data_url("data:;base64,AAAA").is_none());
    }

    #[test]
    fn extensions() {
        assert_eq!(extension_for("audio/mpeg"), "mp3");
        assert_eq!(extension_for("image/x-icon"), "xicon");
        assert_eq!(extension_for("weird"), "bin");
    }

    #[test]
    fn prefix_cannot_escape_directory() {
        assert_eq!(sanitize_prefix("../../etc"), "etc");
        assert_eq!(sanitize_prefix(""), "file");
        assert_eq!(sanitize_prefix("voice"), "voice");
    }

    #[tokio::test]
    async fn references_resolve_inside_directory() {
        let media = DiskMedia::new(temp_dir("paths")).await.unwrap();
        assert_eq!(
            media.path_for("/uploads/a.png"),
            Some(media.dir().join("a.png"))
        );
        assert_eq!(
            media.path_for("/uploads/../../secret"),
            Some(media.dir().join("secret"))
        );
        assert!(media.path_for("/elsewhere/a.png").is_none());
        assert!(media.path_for("/uploads/").is_none());
    }

    #[tokio::test]
    async fn save_then_delete() {
        let media = DiskMedia::new(temp_dir("save")).await.unwrap();
        let reference = media
            .save_data_url("data:text/plain;base64,aGVsbG8=", "file")
            .await
            .unwrap();
        assert!(reference.starts_with("/uploads/file-"));
        assert!(reference.ends_with(".txt"));

        let path = media.path_for(&reference).unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hello");

        delete_path(&path).await.unwrap();
        assert!(!path.exists());
        // deleting twice is fine
        delete_path(&path).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_bad_payload() {
        let media = DiskMedia::new(temp_dir("bad")).await.unwrap();
        let err = media.save_data_url("hello", "file").await.unwrap_err();
        assert!(matches!(err, UploadError::Malformed));
        let err = media
            .save_data_url("data:a/b;base64,***", "file")
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }
}
