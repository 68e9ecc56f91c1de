//! Chat Completions provider for any OpenAI-compatible endpoint.
//!
//! OpenAI, xAI, OpenRouter, and the OpenAI-compatible surfaces of Anthropic
//! and Google all accept the same request body, so one provider covers every
//! catalog entry.

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::Serialize,
    serde_json::{Value, json},
    tracing::{debug, trace, warn},
};

use crate::model::{ChatMessage, CompletionResponse, LlmProvider, ToolCall, Usage};

/// Chat Completions tool format (nested under "function").
#[derive(Debug, Serialize)]
pub struct ChatCompletionsTool {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub function: ChatCompletionsFunction,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionsFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Convert registry schemas (`{name, description, parameters}`) to the
/// Chat Completions `tools` array.
pub fn to_openai_tools(tools: &[Value]) -> Vec<Value> {
    tools
        .iter()
        .filter_map(|t| {
            let tool = ChatCompletionsTool {
                tool_type: "function",
                function: ChatCompletionsFunction {
                    name: t["name"].as_str()?.to_string(),
                    description: t["description"].as_str().unwrap_or_default().to_string(),
                    parameters: t["parameters"].clone(),
                },
            };
            serde_json::to_value(tool).ok()
        })
        .collect()
}

/// Parse `tool_calls` from a response message.
pub fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
    let Some(calls) = message["tool_calls"].as_array() else {
        return Vec::new();
    };
    calls
        .iter()
        .filter_map(|tc| {
            let args = tc["function"]["arguments"].as_str().unwrap_or("{}");
            Some(ToolCall {
                id: tc["id"].as_str()?.to_string(),
                name: tc["function"]["name"].as_str()?.to_string(),
                arguments: serde_json::from_str(args).unwrap_or_else(|_| json!({})),
            })
        })
        .collect()
}

/// Turn a Chat Completions response body into a [`CompletionResponse`].
pub fn parse_completion(body: &Value) -> anyhow::Result<CompletionResponse> {
    let message = &body["choices"][0]["message"];
    if message.is_null() {
        anyhow::bail!("response has no choices[0].message");
    }
    let text = message["content"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let usage = Usage {
        input_tokens: token_count(&body["usage"]["prompt_tokens"]),
        output_tokens: token_count(&body["usage"]["completion_tokens"]),
    };
    Ok(CompletionResponse {
        text,
        tool_calls: parse_tool_calls(message),
        usage,
    })
}

fn token_count(v: &Value) -> u32 {
    v.as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or_default()
}

pub struct OpenAiCompatProvider {
    api_key: Secret<String>,
    model: String,
    base_url: String,
    provider_name: String,
    client: &'static reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        api_key: Secret<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        provider_name: impl Into<String>,
    ) -> Self {
        Self {
            api_key,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            provider_name: provider_name.into(),
            client: super::shared_http_client(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn id(&self) -> &str {
        &self.model
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> anyhow::Result<CompletionResponse> {
        let mut body = json!({
            "model": self.model,
            "messages": messages.iter().map(ChatMessage::to_openai_value).collect::<Vec<_>>(),
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(to_openai_tools(tools));
        }

        debug!(
            model = %self.model,
            provider = %self.provider_name,
            messages_count = messages.len(),
            tools_count = tools.len(),
            "chat completions request"
        );
        trace!(body = %body, "chat completions request body");

        let http_resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = http_resp.status();
        if !status.is_success() {
            let body_text = http_resp.text().await.unwrap_or_default();
            warn!(
                status = %status,
                model = %self.model,
                provider = %self.provider_name,
                body = %body_text,
                "chat completions API error"
            );
            anyhow::bail!("{} API error HTTP {status}: {body_text}", self.provider_name);
        }

        let resp = http_resp.json::<Value>().await?;
        trace!(response = %resp, "chat completions raw response");
        parse_completion(&resp)
    }
}
