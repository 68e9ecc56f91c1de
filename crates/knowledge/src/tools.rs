//! Agent tools over the knowledge base.
use std::sync::Arc;

use {
    async_trait::async_trait,
    serde_json::json,
    supportdesk_agents::{AgentTool, ToolRegistry},
};

use crate::engine::{KnowledgeBase, ScoredDocument, TopicLookup};

const DEFAULT_NUM_RESULTS: usize = 3;
const MAX_DETAIL_CHUNKS: usize = 3;
const MAX_CHUNK_CHARS: usize = 300;

/// Register the three knowledge tools on `registry`.
pub fn register_tools(registry: &mut ToolRegistry, kb: Arc<KnowledgeBase>) {
    registry.register(Arc::new(SearchKnowledgeBaseTool::new(Arc::clone(&kb))));
    registry.register(Arc::new(GetTopicDetailsTool::new(Arc::clone(&kb))));
    registry.register(Arc::new(ListTopicsTool::new(kb)));
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub fn render_search_results(query: &str, hits: &[ScoredDocument]) -> String {
    if hits.is_empty() {
        return format!(
            "No relevant information found for: {query}\nTry rephrasing your query or searching for related topics."
        );
    }
    let mut out = Vec::new();
    for (i, hit) in hits.iter().enumerate() {
        let doc = &hit.document;
        out.push(format!("\n--- Result {} (relevance: {:.2}) ---", i + 1, hit.score));
        out.push(format!("Topic: {}", doc.title));
        out.push(format!("\nAnswer: {}", doc.answer_summary));
        out.push("\nDetailed Procedures:".to_string());
        for chunk in doc
            .body
            .split("\n\n")
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .take(MAX_DETAIL_CHUNKS)
        {
            out.push(format!("  • {}...", truncate_chars(chunk, MAX_CHUNK_CHARS)));
        }
    }
    out.join("\n")
}

pub fn render_topic(topic: &str, lookup: &TopicLookup) -> String {
    let rule = "=".repeat(60);
    match lookup {
        TopicLookup::Found(doc) => [
            format!("Topic: {}", doc.title),
            format!("\n{rule}"),
            format!("Summary: {}", doc.answer_summary),
            format!("\n{rule}"),
            format!("Detailed Information:\n\n{}", doc.body),
        ]
        .join("\n"),
        TopicLookup::NotFound { suggestions } if !suggestions.is_empty() => {
            let mut out = format!("Topic '{topic}' not found.\n\nDid you mean one of these?\n");
            let lines: Vec<String> = suggestions.iter().map(|s| format!("  - {s}")).collect();
            out.push_str(&lines.join("\n"));
            out
        },
        TopicLookup::NotFound { .. } => format!("Topic '{topic}' not found in knowledge base."),
    }
}

pub fn render_topic_list(category: Option<&str>, topics: &[String]) -> String {
    if topics.is_empty() {
        return match category {
            Some(c) => format!("No topics found for category: {c}."),
            None => "No topics found.".to_string(),
        };
    }
    let mut out = match category {
        Some(c) => format!("Available topics in category: {c}:\n"),
        None => "Available topics:\n".to_string(),
    };
    for t in topics {
        out.push_str(&format!("\n  • {t}"));
    }
    out.push_str(&format!("\n\nTotal: {} topics", topics.len()));
    out
}

/// Tool: ranked search over the knowledge base.
pub struct SearchKnowledgeBaseTool {
    kb: Arc<KnowledgeBase>,
}

impl SearchKnowledgeBaseTool {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self { kb }
    }
}

#[async_trait]
impl AgentTool for SearchKnowledgeBaseTool {
    fn name(&self) -> &str {
        "search_knowledge_base"
    }

    fn description(&self) -> &str {
        "Search the banking support knowledge base for procedures, policies and answers. Use this before answering any account, card, payment or dispute question."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What the customer is asking about"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return (max 10)",
                    "default": DEFAULT_NUM_RESULTS
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let query = params["query"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing 'query' parameter"))?;
        let num_results = params["num_results"]
            .as_u64()
            .map_or(DEFAULT_NUM_RESULTS, |n| n as usize);
        let settings = self.kb.settings();
        let hits = self
            .kb
            .search(query, num_results, settings.tool_min_similarity)
            .await?;
        Ok(json!(render_search_results(query, &hits)))
    }
}

/// Tool: fetch one article by topic.
pub struct GetTopicDetailsTool {
    kb: Arc<KnowledgeBase>,
}

impl GetTopicDetailsTool {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self { kb }
    }
}

#[async_trait]
impl AgentTool for GetTopicDetailsTool {
    fn name(&self) -> &str {
        "get_topic_details"
    }

    fn description(&self) -> &str {
        "Get the full article for a specific knowledge-base topic. Use a title returned by search_knowledge_base or list_topics."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "topic": {
                    "type": "string",
                    "description": "Topic title, or part of it"
                }
            },
            "required": ["topic"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let topic = params["topic"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing 'topic' parameter"))?;
        let lookup = self.kb.get_by_topic(topic).await?;
        Ok(json!(render_topic(topic, &lookup)))
    }
}

/// Tool: list article titles.
pub struct ListTopicsTool {
    kb: Arc<KnowledgeBase>,
}

impl ListTopicsTool {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self { kb }
    }
}

#[async_trait]
impl AgentTool for ListTopicsTool {
    fn name(&self) -> &str {
        "list_topics"
    }

    fn description(&self) -> &str {
        "List the topics available in the knowledge base, optionally filtered by a keyword such as 'card' or 'fees'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "category": {
                    "type": "string",
                    "description": "Optional keyword to filter topic titles"
                }
            }
        })
    }

    async fn execute(&self, params: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let category = params["category"].as_str().filter(|c| !c.trim().is_empty());
        let topics = self.kb.list_topics(category);
        Ok(json!(render_topic_list(category, &topics)))
    }
}
