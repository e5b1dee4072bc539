//! Protocol limits shared by the gateway, the stores and the upload endpoint.

use std::time::Duration;

/// Maximum number of live connections, authenticated or not.
pub const MAX_CLIENTS: usize = 15;

/// Maximum number of messages kept per log (public history or one private thread).
pub const MAX_HISTORY: usize = 500;

/// Message text is cut to this many characters before trimming.
pub const MAX_TEXT_LEN: usize = 10_000;

/// Display names are cut to this many characters before trimming.
pub const MAX_NAME_LEN: usize = 20;

pub const MAX_FILE_NAME_LEN: usize = 200;

/// Attachments older than this are stripped by the sweeper.
pub const MEDIA_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Every valid media reference starts with this path.
pub const UPLOAD_PREFIX: &str = "/uploads/";

pub const DEFAULT_NAME: &str = "Anonymous";
pub const DEFAULT_FILE_NAME: &str = "file";
pub const DEFAULT_FILE_MIME: &str = "application/octet-stream";

/// Separator between the two sorted participant names of a private thread key.
pub const THREAD_KEY_SEPARATOR: char = '|';

/// Cut `s` to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Normalize message text: cut to [`MAX_TEXT_LEN`] characters, then trim.
pub fn clamp_text(raw: &str) -> String {
    truncate_chars(raw, MAX_TEXT_LEN).trim().to_string()
}

/// Normalize a display name. Never returns an empty string.
pub fn display_name(raw: Option<&str>) -> String {
    let name = truncate_chars(raw.unwrap_or_default(), MAX_NAME_LEN).trim();
    if name.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("привет", 3), "при");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn display_name_is_cut_then_trimmed() {
        assert_eq!(display_name(Some("  Alice  ")), "Alice");
        assert_eq!(display_name(Some("abcdefghijklmnopqrstuvwxyz")), "abcdefghijklmnopqrst");
        // 19 spaces then text: only the spaces survive the cut
        let padded = format!("{}xyz", " ".repeat(19));
        assert_eq!(display_name(Some(&padded)), "x");
    }

    #[test]
    fn empty_names_fall_back_to_default() {
        assert_eq!(display_name(None), DEFAULT_NAME);
        assert_eq!(display_name(Some("")), DEFAULT_NAME);
        assert_eq!(display_name(Some("    ")), DEFAULT_NAME);
    }

    #[test]
    fn text_is_clamped() {
        let long = "a".repeat(MAX_TEXT_LEN + 50);
        assert_eq!(clamp_text(&long).chars().count(), MAX_TEXT_LEN);
        assert_eq!(clamp_text("  hi \n"), "hi");
    }
}
