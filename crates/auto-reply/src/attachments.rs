//! Inbound attachments → model content parts.

use {
    base64::{Engine, engine::general_purpose::STANDARD},
    supportdesk_agents::{ContentPart, UserContent},
    supportdesk_common::{Attachment, AttachmentSource},
    tracing::{debug, warn},
};

/// Largest attachment forwarded to the model.
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

const TEXT_MIME_TYPES: &[&str] = &[
    "text/plain",
    "text/markdown",
    "text/csv",
    "text/html",
    "text/css",
    "text/xml",
    "text/javascript",
    "text/x-log",
    "application/json",
    "application/xml",
    "application/x-yaml",
    "application/yaml",
];

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "log", "md", "csv", "json", "xml", "yaml", "yml", "html", "htm", "sql",
];

fn is_text_like(attachment: &Attachment) -> bool {
    let mime = attachment.mime_type.to_ascii_lowercase();
    if mime.starts_with("text/") || TEXT_MIME_TYPES.contains(&mime.as_str()) {
        return true;
    }
    attachment
        .name
        .as_deref()
        .and_then(|n| n.rsplit_once('.'))
        .is_some_and(|(_, ext)| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Convert one attachment into a content part. Anything the model cannot
/// read becomes a short bracketed note so the agent knows it was sent.
pub fn attachment_part(attachment: &Attachment) -> ContentPart {
    let name = attachment.display_name();
    let mime = attachment.mime_type.as_str();
    let bytes = match &attachment.source {
        AttachmentSource::Url { url } => {
            debug!(name, url = %url, "attachment not downloaded");
            return ContentPart::Text(format!(
                "[File '{name}' was shared as a link and could not be read]"
            ));
        },
        AttachmentSource::Bytes { bytes } => bytes,
    };

    if bytes.len() > MAX_ATTACHMENT_BYTES {
        warn!(name, size = bytes.len(), "skipping oversized attachment");
        return ContentPart::Text(format!(
            "[File '{name}' is too large to process (max 10MB)]"
        ));
    }

    if mime.starts_with("image/") {
        return ContentPart::Image {
            media_type: mime.to_string(),
            data: STANDARD.encode(bytes),
        };
    }

    if is_text_like(attachment) {
        return match std::str::from_utf8(bytes) {
            Ok(text) => ContentPart::Text(format!("**File: {name}**\n```\n{text}\n```")),
            Err(_) => {
                warn!(name, mime, "attachment is not valid UTF-8");
                ContentPart::Text(format!("[File '{name}' could not be decoded as text]"))
            },
        };
    }

    if mime == "application/pdf" {
        return ContentPart::Text(format!(
            "[PDF file '{name}' received but its contents cannot be read]"
        ));
    }

    warn!(name, mime, "unsupported attachment type");
    ContentPart::Text(format!("[File '{name}' has unsupported type: {mime}]"))
}

/// Message text plus attachments as one user turn.
///
/// Without attachments this is plain text; otherwise the text leads a
/// multimodal part list.
pub fn build_user_content(text: &str, attachments: &[Attachment]) -> UserContent {
    if attachments.is_empty() {
        return UserContent::Text(text.to_string());
    }
    let mut parts = Vec::with_capacity(attachments.len() + 1);
    if !text.trim().is_empty() {
        parts.push(ContentPart::Text(text.to_string()));
    }
    parts.extend(attachments.iter().map(attachment_part));
    UserContent::Multimodal(parts)
}

/// The form of a user turn kept in session history: image payloads are
/// replaced by a note so later turns do not resend them.
pub fn history_content(content: &UserContent) -> UserContent {
    match content {
        UserContent::Text(text) => UserContent::Text(text.clone()),
        UserContent::Multimodal(parts) => UserContent::Multimodal(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Image { media_type, .. } => {
                        ContentPart::Text(format!("[Image attachment ({media_type}) was shared]"))
                    },
                    ContentPart::Text(text) => ContentPart::Text(text.clone()),
                })
                .collect(),
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn bytes(mime: &str, name: &str, data: &[u8]) -> Attachment {
        Attachment {
            mime_type: mime.into(),
            name: Some(name.into()),
            source: AttachmentSource::Bytes {
                bytes: data.to_vec(),
            },
        }
    }

    fn text_of(part: &ContentPart) -> &str {
        match part {
            ContentPart::Text(t) => t,
            ContentPart::Image { .. } => panic!("expected text part"),
        }
    }

    #[test]
    fn image_becomes_base64_part() {
        match attachment_part(&bytes("image/png", "receipt.png", b"hello")) {
            ContentPart::Image { media_type, data } => {
                assert_eq!(media_type, "image/png");
                assert_eq!(data, "aGVsbG8=");
            },
            ContentPart::Text(t) => panic!("unexpected text {t}"),
        }
    }

    #[test]
    fn text_file_is_inlined_as_fenced_block() {
        let part = attachment_part(&bytes("application/octet-stream", "app.log", b"ERR 42"));
        assert_eq!(text_of(&part), "**File: app.log**\n```\nERR 42\n```");
    }

    #[test]
    fn invalid_utf8_text_is_noted() {
        let part = attachment_part(&bytes("text/plain", "bad.txt", &[0xff, 0xfe]));
        assert_eq!(
            text_of(&part),
            "[File 'bad.txt' could not be decoded as text]"
        );
    }

    #[test]
    fn oversized_url_and_unsupported_become_notes() {
        let big = bytes("image/png", "huge.png", &vec![0; MAX_ATTACHMENT_BYTES + 1]);
        assert!(text_of(&attachment_part(&big)).contains("too large"));

        let link = Attachment {
            mime_type: "application/pdf".into(),
            name: None,
            source: AttachmentSource::Url {
                url: "https://files.example/s.pdf".into(),
            },
        };
        assert_eq!(
            text_of(&attachment_part(&link)),
            "[File 'unnamed' was shared as a link and could not be read]"
        );

        let zip = bytes("application/zip", "logs.zip", b"PK");
        assert_eq!(
            text_of(&attachment_part(&zip)),
            "[File 'logs.zip' has unsupported type: application/zip]"
        );
    }

    #[test]
    fn history_drops_image_payloads() {
        let content = build_user_content(
            "see attached",
            &[
                bytes("image/jpeg", "card.jpg", b"hello"),
                bytes("text/plain", "note.txt", b"hi"),
            ],
        );
        let UserContent::Multimodal(parts) = history_content(&content) else {
            panic!("expected multimodal");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(text_of(&parts[0]), "see attached");
        assert_eq!(text_of(&parts[1]), "[Image attachment (image/jpeg) was shared]");
        assert_eq!(text_of(&parts[2]), "**File: note.txt**\n```\nhi\n```");
    }

    #[test]
    fn user_content_keeps_text_first() {
        assert!(matches!(
            build_user_content("hi", &[]),
            UserContent::Text(ref t) if t == "hi"
        ));
        match build_user_content("see attached", &[bytes("text/csv", "tx.csv", b"a,b")]) {
            UserContent::Multimodal(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(text_of(&parts[0]), "see attached");
            },
            UserContent::Text(_) => panic!("expected multimodal"),
        }
    }
}
