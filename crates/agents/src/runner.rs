//! The agent turn: call the model, run the tools it asks for, repeat until it
//! answers in plain text.

use std::{fmt::Write, sync::Arc};

use {
    serde_json::{Value, json},
    supportdesk_config::AgentConfig,
    tracing::{debug, info, trace, warn},
};

use crate::{
    model::{ChatMessage, CompletionResponse, LlmProvider, ToolCall, Usage, UserContent},
    tool_registry::ToolRegistry,
};

/// Typed errors from the agent loop.
#[derive(Debug, thiserror::Error)]
pub enum AgentRunError {
    #[error("agent loop exceeded {0} iterations")]
    MaxIterations(usize),
    /// The model chain failed (including terminal fallback failures).
    #[error(transparent)]
    Model(#[from] anyhow::Error),
}

/// Limits for one agent turn.
#[derive(Debug, Clone, Copy)]
pub struct AgentLoopConfig {
    pub max_iterations: usize,
    pub max_tool_result_bytes: usize,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for AgentLoopConfig {
    fn from(cfg: &AgentConfig) -> Self {
        Self {
            max_iterations: cfg.max_iterations.max(1),
            max_tool_result_bytes: cfg.max_tool_result_bytes,
        }
    }
}

/// Result of running the agent loop.
#[derive(Debug)]
pub struct AgentRunResult {
    /// Final assistant text. Empty when the model produced none.
    pub text: String,
    pub iterations: usize,
    pub tool_calls_made: usize,
    /// Sum of usage across all model requests in this run.
    pub usage: Usage,
}

/// Truncate a tool result to `max_bytes` at a char boundary, with a marker.
pub fn sanitize_tool_result(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    let mut result = input[..end].to_string();
    let _ = write!(result, "\n\n[truncated, {} bytes total]", input.len());
    result
}

/// Run the agent loop.
///
/// `history` goes between the system prompt and the new user message.
pub async fn run_agent_loop(
    provider: Arc<dyn LlmProvider>,
    tools: &ToolRegistry,
    system_prompt: &str,
    user_content: &UserContent,
    history: Vec<ChatMessage>,
    config: AgentLoopConfig,
) -> Result<AgentRunResult, AgentRunError> {
    let native_tools = provider.supports_tools();
    let tool_schemas = if native_tools {
        tools.list_schemas()
    } else {
        Vec::new()
    };

    info!(
        provider = provider.name(),
        model = provider.id(),
        native_tools,
        tools_count = tool_schemas.len(),
        history_len = history.len(),
        "starting agent loop"
    );

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(history);
    messages.push(ChatMessage::User {
        content: user_content.clone(),
    });

    let mut usage = Usage::default();
    let mut total_tool_calls = 0;

    for iteration in 1..=config.max_iterations {
        debug!(iteration, messages_count = messages.len(), "calling LLM");

        let response: CompletionResponse = provider.complete(&messages, &tool_schemas).await?;
        usage += response.usage;

        info!(
            iteration,
            has_text = response.text.is_some(),
            tool_calls_count = response.tool_calls.len(),
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "LLM response received"
        );

        if response.tool_calls.is_empty() {
            let text = response.text.unwrap_or_default();
            info!(
                iterations = iteration,
                tool_calls = total_tool_calls,
                "agent loop complete"
            );
            return Ok(AgentRunResult {
                text,
                iterations: iteration,
                tool_calls_made: total_tool_calls,
                usage,
            });
        }

        messages.push(ChatMessage::assistant_with_tools(
            response.text.clone(),
            response.tool_calls.clone(),
        ));
        total_tool_calls += response.tool_calls.len();

        let results =
            futures::future::join_all(response.tool_calls.iter().map(|tc| execute_tool(tools, tc)))
                .await;

        for (tc, result) in response.tool_calls.iter().zip(results) {
            let content = sanitize_tool_result(&result.to_string(), config.max_tool_result_bytes);
            trace!(tool = %tc.name, content = %content, "tool result");
            messages.push(ChatMessage::tool(&tc.id, content));
        }
    }

    warn!(
        max_iterations = config.max_iterations,
        "agent loop exceeded max iterations"
    );
    Err(AgentRunError::MaxIterations(config.max_iterations))
}

async fn execute_tool(tools: &ToolRegistry, tc: &ToolCall) -> Value {
    let Some(tool) = tools.get(&tc.name) else {
        warn!(tool = %tc.name, id = %tc.id, "model requested unknown tool");
        return json!({ "error": format!("unknown tool: {}", tc.name) });
    };
    info!(tool = %tc.name, id = %tc.id, args = %tc.arguments, "executing tool");
    match tool.execute(tc.arguments.clone()).await {
        Ok(value) => json!({ "result": value }),
        Err(e) => {
            warn!(tool = %tc.name, id = %tc.id, error = %e, "tool execution failed");
            json!({ "error": e.to_string() })
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::tool_registry::AgentTool,
        async_trait::async_trait,
        std::sync::Mutex,
    };

    /// Replays scripted responses and records the messages it was sent.
    struct ScriptedProvider {
        script: Mutex<Vec<CompletionResponse>>,
        seen: Mutex<Vec<Vec<Value>>>,
    }

    impl ScriptedProvider {
        fn new(mut script: Vec<CompletionResponse>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                script: Mutex::new(script),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn id(&self) -> &str {
            "scripted"
        }

        fn supports_tools(&self) -> bool {
            true
        }

        async fn complete(
            &self,
            messages: &[ChatMessage],
            _tools: &[Value],
        ) -> anyhow::Result<CompletionResponse> {
            self.seen
                .lock()
                .unwrap()
                .push(messages.iter().map(ChatMessage::to_openai_value).collect());
            self.script
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
    }

    struct EchoTool;

    #[async_trait]
    impl AgentTool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the input"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn execute(&self, params: Value) -> anyhow::Result<Value> {
            match params["text"].as_str() {
                Some(t) => Ok(Value::String(t.repeat(2))),
                None => anyhow::bail!("missing text"),
            }
        }
    }

    fn tool_call(id: &str, name: &str, args: Value) -> CompletionResponse {
        CompletionResponse {
            text: None,
            tool_calls: vec![ToolCall {
                id: id.into(),
                name: name.into(),
                arguments: args,
            }],
            usage: Usage {
                input_tokens: 10,
                output_tokens: 2,
            },
        }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(Arc::new(EchoTool));
        r
    }

    #[tokio::test]
    async fn plain_text_answer_ends_loop() {
        let provider = ScriptedProvider::new(vec![CompletionResponse::text("Hello!")]);
        let result = run_agent_loop(
            provider.clone(),
            &registry(),
            "be nice",
            &UserContent::Text("hi".into()),
            vec![ChatMessage::user("earlier"), ChatMessage::assistant("reply")],
            AgentLoopConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(result.text, "Hello!");
        assert_eq!(result.iterations, 1);
        let seen = provider.seen.lock().unwrap();
        let roles: Vec<&str> = seen[0].iter().map(|m| m["role"].as_str().unwrap()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
    }

    #[tokio::test]
    async fn tool_results_are_fed_back() {
        let provider = ScriptedProvider::new(vec![
            tool_call("c1", "echo", json!({"text": "ab"})),
            tool_call("c2", "nope", json!({})),
            tool_call("c3", "echo", json!({})),
            CompletionResponse::text("done"),
        ]);
        let result = run_agent_loop(
            provider.clone(),
            &registry(),
            "sys",
            &UserContent::Text("go".into()),
            vec![],
            AgentLoopConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(result.text, "done");
        assert_eq!(result.iterations, 4);
        assert_eq!(result.tool_calls_made, 3);
        assert_eq!(result.usage.input_tokens, 30);

        let seen = provider.seen.lock().unwrap();
        let last = seen.last().unwrap();
        let tool_contents: Vec<&str> = last
            .iter()
            .filter(|m| m["role"] == "tool")
            .map(|m| m["content"].as_str().unwrap())
            .collect();
        assert_eq!(tool_contents, vec![
            r#"{"result":"abab"}"#,
            r#"{"error":"unknown tool: nope"}"#,
            r#"{"error":"missing text"}"#,
        ]);
    }

    #[tokio::test]
    async fn max_iterations_is_enforced() {
        let provider = ScriptedProvider::new(vec![
            tool_call("c1", "echo", json!({"text": "a"})),
            tool_call("c2", "echo", json!({"text": "b"})),
        ]);
        let err = run_agent_loop(
            provider,
            &registry(),
            "sys",
            &UserContent::Text("go".into()),
            vec![],
            AgentLoopConfig {
                max_iterations: 2,
                max_tool_result_bytes: 1000,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AgentRunError::MaxIterations(2)));
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let provider = ScriptedProvider::new(vec![]);
        let err = run_agent_loop(
            provider,
            &registry(),
            "sys",
            &UserContent::Text("go".into()),
            vec![],
            AgentLoopConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AgentRunError::Model(_)));
    }

    #[test]
    fn sanitize_truncates_at_char_boundary() {
        assert_eq!(sanitize_tool_result("short", 10), "short");
        let out = sanitize_tool_result("ééééé", 3);
        assert!(out.starts_with("é\n\n[truncated, 10 bytes total]"));
    }
}
