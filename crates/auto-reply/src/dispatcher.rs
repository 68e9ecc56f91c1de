use std::{collections::HashMap, sync::Arc, time::Instant};

use {
    serde_json::Value,
    supportdesk_agents::{
        AgentLoopConfig, ChatMessage, EscalationDecision, EscalationGate, GateVerdict,
        LlmProvider, ToolRegistry, model::values_to_chat_messages, run_agent_loop,
    },
    supportdesk_channels::{ChannelOutbound, OutboundRegistry, ReplyTarget},
    supportdesk_common::{ChannelKind, DispatchResult, InboundEvent},
    supportdesk_config::SupportdeskConfig,
    supportdesk_sessions::{RunOutcome, RunState, SessionStore, get_or_create, session_id_for},
    tracing::{debug, error, info, warn},
};

use crate::{
    attachments::{build_user_content, history_content},
    error::{Error, Result},
    guard::{Claim, EventClaims, PendingGuard},
    prompt::system_prompt_for,
};

/// Detail reported for a duplicate delivery.
pub const ALREADY_PROCESSING: &str = "already processing";

/// Attempts at resolving a session before giving up.
const SESSION_ATTEMPTS: u32 = 3;

/// Turns inbound channel events into agent replies.
///
/// Shared across tasks behind an `Arc`; every per-event value lives on the
/// task's stack.
pub struct SessionDispatcher {
    model: Arc<dyn LlmProvider>,
    sessions: Arc<dyn SessionStore>,
    outbounds: OutboundRegistry,
    tools: ToolRegistry,
    gate: Option<EscalationGate>,
    claims: Arc<dyn EventClaims>,
    loop_config: AgentLoopConfig,
    handoff_message: String,
    prompts: HashMap<ChannelKind, String>,
}

pub struct DispatcherBuilder {
    model: Arc<dyn LlmProvider>,
    sessions: Arc<dyn SessionStore>,
    outbounds: OutboundRegistry,
    tools: ToolRegistry,
    gate: Option<EscalationGate>,
    escalation_enabled: bool,
    claims: Option<Arc<dyn EventClaims>>,
    loop_config: AgentLoopConfig,
    handoff_message: String,
    prompts: HashMap<ChannelKind, String>,
}

impl DispatcherBuilder {
    pub fn new(
        model: Arc<dyn LlmProvider>,
        sessions: Arc<dyn SessionStore>,
        outbounds: OutboundRegistry,
    ) -> Self {
        let defaults = SupportdeskConfig::default();
        Self {
            model,
            sessions,
            outbounds,
            tools: ToolRegistry::new(),
            gate: None,
            escalation_enabled: defaults.escalation.enabled,
            claims: None,
            loop_config: AgentLoopConfig::from(&defaults.agent),
            handoff_message: defaults.escalation.handoff_message,
            prompts: HashMap::new(),
        }
    }

    /// Take agent limits and escalation settings from config.
    #[must_use]
    pub fn config(mut self, config: &SupportdeskConfig) -> Self {
        self.loop_config = AgentLoopConfig::from(&config.agent);
        self.escalation_enabled = config.escalation.enabled;
        self.handoff_message = config.escalation.handoff_message.clone();
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn gate(mut self, gate: EscalationGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Replace the process-local [`PendingGuard`], e.g. with a shared store.
    #[must_use]
    pub fn claims(mut self, claims: Arc<dyn EventClaims>) -> Self {
        self.claims = Some(claims);
        self
    }

    #[must_use]
    pub fn loop_config(mut self, loop_config: AgentLoopConfig) -> Self {
        self.loop_config = loop_config;
        self
    }

    #[must_use]
    pub fn handoff_message(mut self, message: impl Into<String>) -> Self {
        self.handoff_message = message.into();
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, kind: ChannelKind, prompt: impl Into<String>) -> Self {
        self.prompts.insert(kind, prompt.into());
        self
    }

    pub fn build(self) -> SessionDispatcher {
        let gate = if self.escalation_enabled {
            self.gate
        } else {
            None
        };
        SessionDispatcher {
            model: self.model,
            sessions: self.sessions,
            outbounds: self.outbounds,
            tools: self.tools,
            gate,
            claims: self
                .claims
                .unwrap_or_else(|| Arc::new(PendingGuard::new())),
            loop_config: self.loop_config,
            handoff_message: self.handoff_message,
            prompts: self.prompts,
        }
    }
}

impl SessionDispatcher {
    pub fn builder(
        model: Arc<dyn LlmProvider>,
        sessions: Arc<dyn SessionStore>,
        outbounds: OutboundRegistry,
    ) -> DispatcherBuilder {
        DispatcherBuilder::new(model, sessions, outbounds)
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    fn prompt_for(&self, kind: ChannelKind) -> String {
        self.prompts
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| system_prompt_for(kind))
    }

    /// Process one inbound event end to end. Never panics on turn failure;
    /// failures come back as [`DispatchOutcome::Error`].
    ///
    /// [`DispatchOutcome::Error`]: supportdesk_common::DispatchOutcome::Error
    pub async fn handle_inbound_event(&self, event: InboundEvent) -> DispatchResult {
        let event_id = event.external_event_id.as_str();
        let Some(_claim) = Claim::acquire(Arc::clone(&self.claims), event_id) else {
            info!(event_id, channel = %event.channel_kind, "duplicate delivery skipped");
            return DispatchResult::skipped(ALREADY_PROCESSING);
        };

        let started = Instant::now();
        let session_id = session_id_for(event.channel_kind, &event.external_thread_key);
        info!(
            event_id,
            session_id = %session_id,
            channel = %event.channel_kind,
            attachments = event.attachments.len(),
            "inbound event"
        );

        let mut decision = None;
        match self.run_turn(&event, &session_id, &mut decision).await {
            Ok(text) => {
                info!(
                    event_id,
                    session_id = %session_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "reply posted"
                );
                DispatchResult::posted(text)
            },
            Err(e) => {
                error!(
                    event_id,
                    session_id = %session_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "turn failed"
                );
                let run = RunState::new(decision, RunOutcome::Failed {
                    detail: e.to_string(),
                });
                if let Err(record_err) = self.sessions.record_run(&session_id, run).await {
                    debug!(event_id, error = %record_err, "failed run not recorded");
                }
                DispatchResult::error(e.to_string())
            },
        }
    }

    async fn run_turn(
        &self,
        event: &InboundEvent,
        session_id: &str,
        decision: &mut Option<EscalationDecision>,
    ) -> Result<String> {
        let outbound = self.outbounds.get(event.channel_kind)?;
        let target = ReplyTarget::from(event);

        let session = get_or_create(
            self.sessions.as_ref(),
            event.channel_kind,
            &event.external_thread_key,
            SESSION_ATTEMPTS,
        )
        .await?;

        if let Some(gate) = &self.gate {
            match gate.gate(&event.message_text).await {
                GateVerdict::Terminate(d) => {
                    *decision = Some(d.clone());
                    return self
                        .hand_off(event, &session.session_id, outbound.as_ref(), &target, d)
                        .await;
                },
                GateVerdict::Continue(d) => *decision = Some(d),
            }
        }

        let user_content = build_user_content(&event.message_text, &event.attachments);
        let history = self.sessions.history(session_id).await?;
        let prompt = self.prompt_for(event.channel_kind);

        let run = run_agent_loop(
            Arc::clone(&self.model),
            &self.tools,
            &prompt,
            &user_content,
            values_to_chat_messages(&history),
            self.loop_config,
        )
        .await?;

        let text = run.text.trim();
        if text.is_empty() {
            return Err(Error::NoAssistantReply);
        }
        let text = text.to_string();

        outbound.send_reply(&target, &text).await?;
        let turn: [Value; 2] = [
            ChatMessage::User {
                content: history_content(&user_content),
            }
            .to_openai_value(),
            ChatMessage::assistant(text.as_str()).to_openai_value(),
        ];
        self.persist_delivered(
            event,
            session_id,
            &turn,
            RunState::new(decision.clone(), RunOutcome::Posted),
        )
        .await;

        debug!(
            event_id = %event.external_event_id,
            iterations = run.iterations,
            tool_calls = run.tool_calls_made,
            input_tokens = run.usage.input_tokens,
            output_tokens = run.usage.output_tokens,
            "agent turn complete"
        );
        Ok(text)
    }

    async fn hand_off(
        &self,
        event: &InboundEvent,
        session_id: &str,
        outbound: &dyn ChannelOutbound,
        target: &ReplyTarget,
        decision: EscalationDecision,
    ) -> Result<String> {
        info!(
            event_id = %event.external_event_id,
            session_id,
            reason = %decision.reason,
            "handing off to human support"
        );
        if let Err(e) = outbound.flag_escalation(target, &decision.reason).await {
            warn!(event_id = %event.external_event_id, error = %e, "could not flag escalation");
        }
        outbound.send_reply(target, &self.handoff_message).await?;

        let turn = [
            ChatMessage::user(event.message_text.as_str()).to_openai_value(),
            ChatMessage::assistant(self.handoff_message.as_str()).to_openai_value(),
        ];
        self.persist_delivered(
            event,
            session_id,
            &turn,
            RunState::new(Some(decision), RunOutcome::Escalated),
        )
        .await;
        Ok(self.handoff_message.clone())
    }

    /// Store a turn whose reply already reached the customer. The reply
    /// stands even if storage fails, so failures here are only logged.
    async fn persist_delivered(
        &self,
        event: &InboundEvent,
        session_id: &str,
        turn: &[Value],
        run: RunState,
    ) {
        if let Err(e) = self.sessions.append_history(session_id, turn).await {
            warn!(
                event_id = %event.external_event_id,
                session_id,
                error = %e,
                "delivered reply not added to history"
            );
        }
        if let Err(e) = self.sessions.record_run(session_id, run).await {
            warn!(
                event_id = %event.external_event_id,
                session_id,
                error = %e,
                "delivered reply not recorded as a run"
            );
        }
    }
}
