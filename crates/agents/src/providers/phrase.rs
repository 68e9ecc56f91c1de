//! Offline YES/NO hand-off classifier.
//!
//! Answers the escalation prompt without a network call by matching explicit
//! requests for a human. Used when no classifier model is configured.

use std::sync::LazyLock;

use {async_trait::async_trait, regex::Regex, serde_json::Value};

use crate::model::{ChatMessage, CompletionResponse, LlmProvider, UserContent};

// Words like "human" or "escalate" only count inside a request: "human
// resources" or "fees escalate" are ordinary questions.
#[allow(clippy::expect_used)]
static HANDOFF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(real|actual|live)\s+(person|human|agent|rep|representative)\b",
        r"|\bhuman\s+(agent|being|support)\b",
        r"|\b(talk|speak|chat)\s+(to|with)\s+(someone|somebody|a\s+person|a\s+human|an?\s+agent",
        r"|a\s+representative|a\s+manager|a\s+supervisor|support|staff",
        r"|(your|the)\s+(support\s+)?team)\b",
        r"|\b(want|need|get|request)\s+(me\s+)?(a|an)\s+(human|person|representative|manager|supervisor)\b",
        r"|\bescalate\s+(this|it|me|my\s+\w+|the\s+(issue|case|ticket|complaint|matter))\b",
        r"|\bconnect\s+me\s+(to|with)\b",
        r"|\btransfer\s+me\b",
    ))
    .expect("hand-off regex should compile")
});

/// Prefix the gate puts in front of the customer's text.
const CUSTOMER_PREFIX: &str = "Customer message:";

/// Phrase-matching stand-in for a classifier model.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhraseIntentModel;

impl PhraseIntentModel {
    /// True when `text` explicitly asks for a human.
    #[must_use]
    pub fn wants_human(text: &str) -> bool {
        HANDOFF.is_match(text)
    }
}

fn last_user_text(messages: &[ChatMessage]) -> Option<&str> {
    messages.iter().rev().find_map(|m| match m {
        ChatMessage::User {
            content: UserContent::Text(text),
        } => Some(text.as_str()),
        _ => None,
    })
}

#[async_trait]
impl LlmProvider for PhraseIntentModel {
    fn name(&self) -> &str {
        "phrase"
    }

    fn id(&self) -> &str {
        "phrase-intent"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _tools: &[Value],
    ) -> anyhow::Result<CompletionResponse> {
        let Some(text) = last_user_text(messages) else {
            anyhow::bail!("phrase classifier needs a text user message");
        };
        let text = text.trim_start();
        let text = text.strip_prefix(CUSTOMER_PREFIX).unwrap_or(text);
        let answer = if Self::wants_human(text) {
            "YES"
        } else {
            "NO"
        };
        Ok(CompletionResponse::text(answer))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("I need to talk to a human.")]
    #[case("Please escalate this to your team.")]
    #[case("Can I speak with a real person?")]
    #[case("Connect me to support.")]
    #[case("Get me a live agent.")]
    #[case("Can you transfer me to billing?")]
    #[case("I want a representative now")]
    #[case("Could I chat with your support team please")]
    #[case("I need a human, not a bot")]
    #[case("Please escalate my complaint.")]
    fn explicit_handoff_requests(#[case] text: &str) {
        assert!(PhraseIntentModel::wants_human(text), "{text}");
    }

    #[rstest]
    #[case("I need help changing my account settings.")]
    #[case("Can you explain how this works?")]
    #[case("This is confusing, can someone help?")]
    #[case("Please reply soon.")]
    #[case("I'd like to reach out for help understanding something.")]
    #[case("I was wondering if I could get some help with this setup.")]
    #[case("Could you clarify how to move my deployment to a different repo?")]
    #[case("Can you help me understand this error?")]
    #[case("URGENT: my card was charged twice, thank you!")]
    #[case("Why did my monthly fees escalate so much?")]
    #[case("Is the human resources payroll deposit delayed?")]
    #[case("My company's representative card was declined, can you help?")]
    #[case("The support team told me my card ships Monday, has it shipped?")]
    fn ordinary_help_requests(#[case] text: &str) {
        assert!(!PhraseIntentModel::wants_human(text), "{text}");
    }

    #[tokio::test]
    async fn answers_in_classifier_format() {
        let model = PhraseIntentModel;
        let yes = model
            .complete(
                &[
                    ChatMessage::system("prompt"),
                    ChatMessage::user("Customer message: get me a live agent"),
                ],
                &[],
            )
            .await
            .unwrap();
        assert_eq!(yes.text.as_deref(), Some("YES"));

        let no = model
            .complete(&[ChatMessage::user("Customer message: hi")], &[])
            .await
            .unwrap();
        assert_eq!(no.text.as_deref(), Some("NO"));

        assert!(model.complete(&[ChatMessage::system("x")], &[]).await.is_err());
    }
}
