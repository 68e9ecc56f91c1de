//! Pre-turn check for explicit requests to reach a human.
//!
//! The gate asks a classifier model for a single YES/NO word. A classifier
//! failure never blocks the turn: it is logged and treated as "continue".

use std::sync::Arc;

use tracing::{debug, info, warn};

pub use supportdesk_common::EscalationDecision;

use crate::model::{ChatMessage, LlmProvider};

pub const ESCALATION_SYSTEM_PROMPT: &str = r#"You are an escalation detector for a customer service system.

Your goal is to decide whether a customer message indicates that they want to speak with a human agent or escalate the issue beyond automated support.

Respond with ONLY:
- "YES" if the customer explicitly asks to talk to a human, real person, or team, or directly requests escalation.
- "NO" for all other cases, including polite or urgent requests for help, clarification, or technical support.

### Guidelines
- Escalation means the customer wants or expects a *human* to take over.
- Do NOT treat urgency ("please respond soon") or politeness ("thank you!") as escalation.
- Do NOT flag normal help or support requests.
- Do flag messages with clear and explicit intent to contact a human, escalate, or reach the support team directly.

### Examples

**YES (escalation):**
- "I need to talk to a human."
- "Please escalate this to your team."
- "Can I speak with a real person?"
- "Connect me to support."
- "Get me a live agent."

**NO (not escalation):**
- "I need help changing my account settings."
- "Can you explain how this works?"
- "This is confusing, can someone help?"
- "Please reply soon."
- "I'd like to reach out for help understanding something."
- "I was wondering if I could get some help with this setup."
- "Could you clarify how to move my deployment to a different repo?"

Output must be exactly one word: **YES** or **NO**"#;

/// Reason recorded when the classifier could not be consulted.
pub const CLASSIFIER_UNAVAILABLE: &str = "classifier unavailable";

#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("classifier call failed: {0:#}")]
    Model(anyhow::Error),

    #[error("classifier returned no text")]
    EmptyReply,

    #[error("classifier reply is neither YES nor NO: {0:?}")]
    Unrecognized(String),
}

/// What the dispatcher should do with the turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    /// Run the agent as usual.
    Continue(EscalationDecision),
    /// Hand off to a human and skip the agent.
    Terminate(EscalationDecision),
}

impl GateVerdict {
    pub fn decision(&self) -> &EscalationDecision {
        match self {
            Self::Continue(d) | Self::Terminate(d) => d,
        }
    }

    pub fn into_decision(self) -> EscalationDecision {
        match self {
            Self::Continue(d) | Self::Terminate(d) => d,
        }
    }

    pub fn is_terminate(&self) -> bool {
        matches!(self, Self::Terminate(_))
    }
}

/// Parse a classifier reply: uppercase, keep letters only, then look for
/// a leading YES or NO.
pub fn parse_verdict(reply: &str) -> Result<bool, ClassificationError> {
    let letters: String = reply
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return Err(ClassificationError::EmptyReply);
    }
    if letters.starts_with("YES") {
        Ok(true)
    } else if letters.starts_with("NO") {
        Ok(false)
    } else {
        Err(ClassificationError::Unrecognized(reply.to_string()))
    }
}

/// Stateless YES/NO hand-off detector.
#[derive(Clone)]
pub struct EscalationGate {
    classifier: Arc<dyn LlmProvider>,
}

impl EscalationGate {
    pub fn new(classifier: Arc<dyn LlmProvider>) -> Self {
        Self { classifier }
    }

    pub fn classifier_id(&self) -> &str {
        self.classifier.id()
    }

    /// Ask the classifier once. Errors are returned, not swallowed.
    pub async fn try_classify(&self, message: &str) -> Result<bool, ClassificationError> {
        let prompt = [
            ChatMessage::system(ESCALATION_SYSTEM_PROMPT),
            ChatMessage::user(format!("Customer message: {message}")),
        ];
        let resp = self
            .classifier
            .complete(&prompt, &[])
            .await
            .map_err(ClassificationError::Model)?;
        let reply = resp.text.ok_or(ClassificationError::EmptyReply)?;
        parse_verdict(&reply)
    }

    /// Classify the customer's latest message.
    pub async fn classify(&self, message: &str) -> EscalationDecision {
        if message.trim().is_empty() {
            return EscalationDecision::proceed("empty message");
        }
        match self.try_classify(message).await {
            Ok(true) => {
                info!(
                    classifier = self.classifier.id(),
                    message = %preview(message, 100),
                    "escalation requested"
                );
                EscalationDecision::escalate("customer asked for a human")
            },
            Ok(false) => {
                debug!(classifier = self.classifier.id(), "no escalation");
                EscalationDecision::proceed("no hand-off requested")
            },
            Err(e) => {
                warn!(classifier = self.classifier.id(), error = %e, "escalation check failed, continuing");
                EscalationDecision::proceed(CLASSIFIER_UNAVAILABLE)
            },
        }
    }

    /// Same as [`classify`](Self::classify), as an explicit control-flow value.
    pub async fn gate(&self, message: &str) -> GateVerdict {
        let decision = self.classify(message).await;
        if decision.requested {
            GateVerdict::Terminate(decision)
        } else {
            GateVerdict::Continue(decision)
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
