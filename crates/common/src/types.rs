//! Wire types shared by the dispatcher, channel adapters, and the CLI.

use serde::{Deserialize, Serialize};

/// Which external surface an inbound event arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Real-time chat (workspace DMs, mentions, chat widgets).
    Chat,
    /// Support tickets (email or helpdesk issues).
    Ticket,
}

impl ChannelKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Ticket => "ticket",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChannelKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            "ticket" => Ok(Self::Ticket),
            other => Err(crate::Error::UnknownChannelKind(other.to_string())),
        }
    }
}

/// Where an attachment's content lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttachmentSource {
    /// Inline content, base64-encoded on the wire.
    Bytes {
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
    },
    /// Remote content the channel did not download.
    Url { url: String },
}

/// A file attached to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub source: AttachmentSource,
}

impl Attachment {
    /// Display name, falling back to a placeholder when the channel omitted it.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }
}

/// One externally delivered message notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    pub channel_kind: ChannelKind,
    pub external_thread_key: String,
    pub external_event_id: String,
    pub message_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl InboundEvent {
    pub fn new(
        channel_kind: ChannelKind,
        external_thread_key: impl Into<String>,
        external_event_id: impl Into<String>,
        message_text: impl Into<String>,
    ) -> Self {
        Self {
            channel_kind,
            external_thread_key: external_thread_key.into(),
            external_event_id: external_event_id.into(),
            message_text: message_text.into(),
            attachments: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Whether a turn was handed off to a human, and why.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EscalationDecision {
    pub requested: bool,
    pub reason: String,
}

impl EscalationDecision {
    pub fn escalate(reason: impl Into<String>) -> Self {
        Self {
            requested: true,
            reason: reason.into(),
        }
    }

    pub fn proceed(reason: impl Into<String>) -> Self {
        Self {
            requested: false,
            reason: reason.into(),
        }
    }
}

/// Terminal state of one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    Posted,
    Skipped,
    Error,
}

/// What the dispatcher reports back to the channel adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub outcome: DispatchOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl DispatchResult {
    pub fn posted(text: impl Into<String>) -> Self {
        Self {
            outcome: DispatchOutcome::Posted,
            assistant_text: Some(text.into()),
            error_detail: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            outcome: DispatchOutcome::Skipped,
            assistant_text: None,
            error_detail: Some(reason.into()),
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            outcome: DispatchOutcome::Error,
            assistant_text: None,
            error_detail: Some(detail.into()),
        }
    }
}

mod base64_bytes {
    use {
        base64::{Engine, engine::general_purpose::STANDARD},
        serde::{Deserialize, Deserializer, Serializer, de::Error as _},
    };

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.trim()).map_err(D::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn inbound_event_parses_camel_case_payload() {
        let raw = r#"{
            "channelKind": "ticket",
            "externalThreadKey": "issue-42",
            "externalEventId": "evt-1",
            "messageText": "my card was charged twice",
            "attachments": [
                {"mimeType": "image/png", "name": "receipt.png", "bytes": "aGVsbG8="},
                {"mimeType": "application/pdf", "url": "https://files.example/statement.pdf"}
            ]
        }"#;
        let event: InboundEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.channel_kind, ChannelKind::Ticket);
        assert_eq!(event.attachments.len(), 2);
        assert_eq!(event.attachments[0].source, AttachmentSource::Bytes {
            bytes: b"hello".to_vec()
        });
        assert!(matches!(
            &event.attachments[1].source,
            AttachmentSource::Url { url } if url.ends_with("statement.pdf")
        ));
        assert_eq!(event.attachments[1].display_name(), "unnamed");
    }

    #[test]
    fn attachments_default_to_empty() {
        let raw = r#"{"channelKind":"chat","externalThreadKey":"C1:1.0","externalEventId":"e","messageText":"hi"}"#;
        let event: InboundEvent = serde_json::from_str(raw).unwrap();
        assert!(event.attachments.is_empty());
    }

    #[test]
    fn dispatch_result_omits_empty_fields() {
        let json = serde_json::to_value(DispatchResult::skipped("already processing")).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert!(json.get("assistantText").is_none());
        assert_eq!(json["errorDetail"], "already processing");
    }

    #[test]
    fn channel_kind_from_str() {
        assert_eq!("Chat".parse::<ChannelKind>().unwrap(), ChannelKind::Chat);
        assert_eq!(
            "fax".parse::<ChannelKind>(),
            Err(crate::Error::UnknownChannelKind("fax".into()))
        );
    }
}
