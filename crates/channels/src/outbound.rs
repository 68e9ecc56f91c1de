use std::sync::atomic::{AtomicBool, Ordering};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    supportdesk_common::{ChannelKind, InboundEvent},
    tokio::sync::Mutex,
    tracing::info,
};

use crate::error::{Error, Result};

/// Where a reply goes back to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTarget {
    pub channel_kind: ChannelKind,
    pub external_thread_key: String,
    /// Event being answered, for threading and audit.
    pub external_event_id: String,
}

impl From<&InboundEvent> for ReplyTarget {
    fn from(event: &InboundEvent) -> Self {
        Self {
            channel_kind: event.channel_kind,
            external_thread_key: event.external_thread_key.clone(),
            external_event_id: event.external_event_id.clone(),
        }
    }
}

/// Send replies to a channel. Each channel kind implements this.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    /// Post `text` into the thread.
    async fn send_reply(&self, target: &ReplyTarget, text: &str) -> Result<()>;

    /// Mark the external record as needing a human (ticket label, chat tag).
    /// No-op by default.
    async fn flag_escalation(&self, _target: &ReplyTarget, _reason: &str) -> Result<()> {
        Ok(())
    }
}

/// Writes replies to the log instead of a remote API.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOutbound;

#[async_trait]
impl ChannelOutbound for LogOutbound {
    async fn send_reply(&self, target: &ReplyTarget, text: &str) -> Result<()> {
        if target.external_thread_key.is_empty() {
            return Err(Error::invalid_input("empty thread key"));
        }
        info!(
            channel = %target.channel_kind,
            thread = %target.external_thread_key,
            event_id = %target.external_event_id,
            chars = text.chars().count(),
            "reply sent"
        );
        Ok(())
    }

    async fn flag_escalation(&self, target: &ReplyTarget, reason: &str) -> Result<()> {
        info!(
            channel = %target.channel_kind,
            thread = %target.external_thread_key,
            event_id = %target.external_event_id,
            reason,
            "thread flagged for human follow-up"
        );
        Ok(())
    }
}

/// A reply captured by [`RecordingOutbound`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentReply {
    pub target: ReplyTarget,
    pub text: String,
}

/// Keeps every reply and escalation flag in memory.
///
/// While offline, sends fail with [`Error::Unavailable`] and nothing is kept.
#[derive(Debug, Default)]
pub struct RecordingOutbound {
    replies: Mutex<Vec<SentReply>>,
    flags: Mutex<Vec<(ReplyTarget, String)>>,
    offline: AtomicBool,
}

impl RecordingOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn replies(&self) -> Vec<SentReply> {
        self.replies.lock().await.clone()
    }

    pub async fn flags(&self) -> Vec<(ReplyTarget, String)> {
        self.flags.lock().await.clone()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChannelOutbound for RecordingOutbound {
    async fn send_reply(&self, target: &ReplyTarget, text: &str) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::unavailable("outbound is offline"));
        }
        self.replies.lock().await.push(SentReply {
            target: target.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn flag_escalation(&self, target: &ReplyTarget, reason: &str) -> Result<()> {
        self.flags
            .lock()
            .await
            .push((target.clone(), reason.to_string()));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn target() -> ReplyTarget {
        ReplyTarget::from(&InboundEvent::new(
            ChannelKind::Ticket,
            "issue-1",
            "evt-1",
            "help",
        ))
    }

    #[tokio::test]
    async fn recording_outbound_keeps_replies_and_flags() {
        let out = RecordingOutbound::new();
        out.send_reply(&target(), "hello").await.unwrap();
        out.flag_escalation(&target(), "customer asked for a human")
            .await
            .unwrap();
        let replies = out.replies().await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].text, "hello");
        assert_eq!(replies[0].target.external_event_id, "evt-1");
        assert_eq!(out.flags().await[0].1, "customer asked for a human");
    }

    #[tokio::test]
    async fn offline_recorder_rejects_sends() {
        let out = RecordingOutbound::new();
        out.set_offline(true);
        assert!(matches!(
            out.send_reply(&target(), "hello").await,
            Err(Error::Unavailable { .. })
        ));
        assert!(out.replies().await.is_empty());

        out.set_offline(false);
        out.send_reply(&target(), "hello").await.unwrap();
        assert_eq!(out.replies().await.len(), 1);
    }

    #[tokio::test]
    async fn log_outbound_rejects_empty_thread() {
        let mut t = target();
        assert!(LogOutbound.send_reply(&t, "hi").await.is_ok());
        t.external_thread_key.clear();
        assert!(matches!(
            LogOutbound.send_reply(&t, "hi").await,
            Err(Error::InvalidInput { .. })
        ));
    }
}
