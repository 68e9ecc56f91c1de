use {
    async_trait::async_trait,
    serde_json::{Value, json},
};

// ── Typed chat messages ─────────────────────────────────────────────────────

/// One message in a model conversation.
///
/// Only fields the model needs. Session metadata stays in the persisted
/// history values and never reaches a provider request.
#[derive(Debug, Clone)]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: UserContent,
    },
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

/// User message content: plain text or text plus images.
#[derive(Debug, Clone)]
pub enum UserContent {
    Text(String),
    Multimodal(Vec<ContentPart>),
}

#[derive(Debug, Clone)]
pub enum ContentPart {
    Text(String),
    /// Base64 image payload without the `data:` prefix.
    Image { media_type: String, data: String },
}

impl ContentPart {
    fn to_openai_value(&self) -> Value {
        match self {
            Self::Text(text) => json!({ "type": "text", "text": text }),
            Self::Image { media_type, data } => json!({
                "type": "image_url",
                "image_url": { "url": format!("data:{media_type};base64,{data}") }
            }),
        }
    }

    fn from_openai_value(block: &Value) -> Option<Self> {
        match block["type"].as_str()? {
            "text" => Some(Self::Text(block["text"].as_str()?.to_string())),
            "image_url" => {
                let (media_type, data) = parse_data_uri(block["image_url"]["url"].as_str()?)?;
                Some(Self::Image {
                    media_type: media_type.to_string(),
                    data: data.to_string(),
                })
            },
            _ => None,
        }
    }
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: UserContent::Text(content.into()),
        }
    }

    pub fn user_multimodal(parts: Vec<ContentPart>) -> Self {
        Self::User {
            content: UserContent::Multimodal(parts),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(content.into()),
            tool_calls: vec![],
        }
    }

    pub fn assistant_with_tools(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content,
            tool_calls,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    /// Convert to the OpenAI Chat Completions message shape.
    ///
    /// This is also the shape persisted in session history.
    #[must_use]
    pub fn to_openai_value(&self) -> Value {
        match self {
            ChatMessage::System { content } => json!({ "role": "system", "content": content }),
            ChatMessage::User {
                content: UserContent::Text(text),
            } => json!({ "role": "user", "content": text }),
            ChatMessage::User {
                content: UserContent::Multimodal(parts),
            } => {
                let blocks: Vec<Value> = parts.iter().map(ContentPart::to_openai_value).collect();
                json!({ "role": "user", "content": blocks })
            },
            ChatMessage::Assistant {
                content,
                tool_calls,
            } if tool_calls.is_empty() => json!({
                "role": "assistant",
                "content": content.as_deref().unwrap_or(""),
            }),
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => {
                let calls: Vec<Value> = tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                let mut msg = json!({ "role": "assistant", "tool_calls": calls });
                if let Some(text) = content {
                    msg["content"] = Value::String(text.clone());
                }
                msg
            },
            ChatMessage::Tool {
                tool_call_id,
                content,
            } => json!({
                "role": "tool",
                "tool_call_id": tool_call_id,
                "content": content,
            }),
        }
    }
}

/// Convert persisted history values back into typed messages.
///
/// Entries without a usable `role` are skipped with a warning.
pub fn values_to_chat_messages(values: &[Value]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(values.len());
    for (i, val) in values.iter().enumerate() {
        let Some(role) = val["role"].as_str() else {
            tracing::warn!(index = i, "skipping history entry without a role");
            continue;
        };
        let message = match role {
            "system" => ChatMessage::system(val["content"].as_str().unwrap_or_default()),
            "user" => match &val["content"] {
                Value::String(text) => ChatMessage::user(text.as_str()),
                Value::Array(blocks) => ChatMessage::user_multimodal(
                    blocks
                        .iter()
                        .filter_map(ContentPart::from_openai_value)
                        .collect(),
                ),
                _ => ChatMessage::user(""),
            },
            "assistant" => ChatMessage::Assistant {
                content: val["content"].as_str().map(str::to_string),
                tool_calls: val["tool_calls"]
                    .as_array()
                    .map(|calls| calls.iter().filter_map(parse_history_tool_call).collect())
                    .unwrap_or_default(),
            },
            "tool" => ChatMessage::tool(
                val["tool_call_id"].as_str().unwrap_or_default(),
                match &val["content"] {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
            ),
            other => {
                tracing::warn!(index = i, role = other, "skipping history entry with unknown role");
                continue;
            },
        };
        messages.push(message);
    }
    messages
}

fn parse_history_tool_call(tc: &Value) -> Option<ToolCall> {
    let args = tc["function"]["arguments"].as_str().unwrap_or("{}");
    Some(ToolCall {
        id: tc["id"].as_str()?.to_string(),
        name: tc["function"]["name"].as_str()?.to_string(),
        arguments: serde_json::from_str(args).unwrap_or_else(|_| json!({})),
    })
}

/// Split `data:<media>;base64,<payload>` into its media type and payload.
pub fn parse_data_uri(uri: &str) -> Option<(&str, &str)> {
    let (media_type, data) = uri.strip_prefix("data:")?.split_once(";base64,")?;
    if media_type.is_empty() || data.is_empty() {
        return None;
    }
    Some((media_type, data))
}

// ── Provider interface ──────────────────────────────────────────────────────

/// A callable chat model. Concrete HTTP providers, the retry and fallback
/// wrappers, and the offline classifier all implement it.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider family or wrapper name, used in logs.
    fn name(&self) -> &str;

    /// Model identifier (e.g. "gpt-5-mini").
    fn id(&self) -> &str;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> anyhow::Result<CompletionResponse>;

    /// Whether `tools` passed to `complete()` are honoured.
    fn supports_tools(&self) -> bool {
        false
    }
}

/// Response from an LLM completion call.
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
}

impl CompletionResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}
