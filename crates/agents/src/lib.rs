//! LLM agent runtime: model interface, retry and fallback, escalation gate,
//! tool registry, and the agent loop.

pub mod escalation;
pub mod model;
pub mod providers;
pub mod resilience;
pub mod runner;
pub mod tool_registry;

pub use {
    escalation::{ClassificationError, EscalationDecision, EscalationGate, GateVerdict},
    model::{ChatMessage, CompletionResponse, ContentPart, LlmProvider, UserContent},
    resilience::{FallbackChain, RetryPolicy, RetryingProvider, TerminalModelError},
    runner::{AgentLoopConfig, AgentRunError, AgentRunResult, run_agent_loop},
    tool_registry::{AgentTool, ToolRegistry},
};
