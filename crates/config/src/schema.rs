//! Config schema types (resilience, models, knowledge, agent, escalation, sessions).
use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportdeskConfig {
    pub resilience: ResilienceConfig,
    pub models: ModelsConfig,
    pub knowledge: KnowledgeConfig,
    pub agent: AgentConfig,
    pub escalation: EscalationConfig,
    pub sessions: SessionsConfig,
}

/// Retry and backoff applied to every model configuration in the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Additional attempts after the first one. Defaults to 2.
    pub max_retries: u32,
    /// Delay before the first retry, in seconds. Defaults to 0.5.
    pub initial_delay_secs: f64,
    /// Multiplier applied to the delay after each retry. Defaults to 2.0.
    pub backoff_factor: f64,
    /// Upper bound on a single attempt. Unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_timeout_secs: Option<f64>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_secs: 0.5,
            backoff_factor: 2.0,
            attempt_timeout_secs: None,
        }
    }
}

/// Model catalog plus the primary/fallback selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Catalog key of the model tried first.
    pub primary: String,
    /// Catalog keys tried in order once the primary is exhausted.
    pub fallbacks: Vec<String>,
    /// Catalog key of the escalation classifier. The offline phrase model is
    /// used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    pub catalog: Vec<ModelEntry>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            primary: "gpt-5-mini".into(),
            fallbacks: Vec::new(),
            classifier: None,
            catalog: builtin_catalog(),
        }
    }
}

impl ModelsConfig {
    /// Look up a catalog entry by key.
    pub fn get(&self, key: &str) -> Option<&ModelEntry> {
        self.catalog.iter().find(|m| m.key == key)
    }

    /// Primary followed by fallbacks, in invocation order.
    pub fn chain_keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.fallbacks.iter().map(String::as_str))
    }
}

/// One callable model configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Short key used by `primary`, `fallbacks`, and `classifier`.
    pub key: String,
    /// Model id sent to the provider API.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Provider family (`openai`, `anthropic`, `xai`, `google`, `openrouter`).
    pub provider: String,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: String,
    /// Inline API key. Takes precedence over `api_key_env`.
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
    /// Override the provider's default OpenAI-compatible base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl std::fmt::Debug for ModelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelEntry")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("api_key_env", &self.api_key_env)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ModelEntry {
    pub fn new(
        key: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
        api_key_env: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            id: id.into(),
            name: name.into(),
            provider: provider.into(),
            api_key_env: api_key_env.into(),
            api_key: None,
            base_url: None,
        }
    }

    /// Resolve the API key from the inline value or the named env var.
    pub fn resolve_api_key(&self) -> Option<Secret<String>> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    pub fn resolve_api_key_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<Secret<String>> {
        if let Some(key) = &self.api_key {
            return Some(key.clone());
        }
        if self.api_key_env.is_empty() {
            return None;
        }
        lookup(&self.api_key_env)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(Secret::new)
    }

    /// Name for logs: the display name, or the key when none was given.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.key
        } else {
            &self.name
        }
    }
}

fn builtin_catalog() -> Vec<ModelEntry> {
    vec![
        ModelEntry::new(
            "grok-4.1-fast",
            "grok-4-1-fast-non-reasoning",
            "Grok 4.1 Fast",
            "xai",
            "XAI_API_KEY",
        ),
        ModelEntry::new(
            "claude-haiku",
            "claude-haiku-4-5",
            "Claude Haiku 4.5",
            "anthropic",
            "ANTHROPIC_API_KEY",
        ),
        ModelEntry::new(
            "claude-sonnet",
            "claude-sonnet-4-5",
            "Claude Sonnet 4.5",
            "anthropic",
            "ANTHROPIC_API_KEY",
        ),
        ModelEntry::new(
            "gpt-5-nano",
            "gpt-5-nano",
            "GPT-5 Nano",
            "openai",
            "OPENAI_API_KEY",
        ),
        ModelEntry::new(
            "gpt-5-mini",
            "gpt-5-mini",
            "GPT-5 Mini",
            "openai",
            "OPENAI_API_KEY",
        ),
        ModelEntry::new(
            "gemini-2.5-flash",
            "gemini-2.5-flash",
            "Gemini 2.5 Flash",
            "google",
            "GOOGLE_API_KEY",
        ),
    ]
}

/// Knowledge-base corpus and retrieval tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub corpus: Vec<CorpusSource>,
    /// Minimum cosine score for direct searches and topic suggestions.
    pub min_similarity: f32,
    /// Minimum cosine score used by the `search_knowledge_base` tool.
    pub tool_min_similarity: f32,
    /// Hard cap on results per search.
    pub max_top_k: usize,
    /// Vocabulary size cap.
    pub max_features: usize,
    /// Longest n-gram fed to the vectorizer.
    pub max_ngram: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            corpus: vec![CorpusSource {
                path: PathBuf::from("data/knowledge.jsonl"),
                source_tag: "ground_truth".into(),
            }],
            min_similarity: 0.1,
            tool_min_similarity: 0.05,
            max_top_k: 10,
            max_features: 5000,
            max_ngram: 3,
        }
    }
}

/// One JSONL corpus file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusSource {
    pub path: PathBuf,
    #[serde(default = "default_source_tag")]
    pub source_tag: String,
}

fn default_source_tag() -> String {
    "ground_truth".into()
}

/// Agent loop limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum LLM round-trips per turn. Defaults to 25.
    pub max_iterations: usize,
    /// Tool output is truncated beyond this many bytes. Defaults to 50 KB.
    pub max_tool_result_bytes: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            max_tool_result_bytes: 50_000,
        }
    }
}

/// Human hand-off behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Whether the escalation gate runs before each turn. Defaults to true.
    pub enabled: bool,
    /// Fixed reply posted when a turn is handed off.
    pub handoff_message: String,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            handoff_message: "I've flagged this conversation for our support team. A member of \
                              the team will follow up with you here shortly."
                .into(),
        }
    }
}

/// Where sessions and their history live.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub store: SessionStoreKind,
    /// Directory for the file store. Defaults to the user data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStoreKind {
    #[default]
    Memory,
    File,
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SupportdeskConfig::default();
        assert_eq!(cfg.resilience.max_retries, 2);
        assert!((cfg.resilience.initial_delay_secs - 0.5).abs() < f64::EPSILON);
        assert!((cfg.resilience.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert!(cfg.resilience.attempt_timeout_secs.is_none());
        assert_eq!(cfg.knowledge.max_top_k, 10);
        assert_eq!(cfg.knowledge.max_features, 5000);
        assert_eq!(cfg.agent.max_iterations, 25);
        assert_eq!(cfg.sessions.store, SessionStoreKind::Memory);
        assert!(cfg.models.get(&cfg.models.primary).is_some());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg: SupportdeskConfig = toml::from_str(
            r#"
            [resilience]
            max_retries = 4

            [models]
            primary = "fast"
            fallbacks = ["slow"]

            [[models.catalog]]
            key = "fast"
            id = "gpt-5-nano"
            provider = "openai"
            api_key_env = "OPENAI_API_KEY"

            [[models.catalog]]
            key = "slow"
            id = "claude-sonnet-4-5"
            provider = "anthropic"
            api_key_env = "ANTHROPIC_API_KEY"
            base_url = "http://localhost:9999/v1"

            [sessions]
            store = "file"
            dir = "/tmp/sessions"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.resilience.max_retries, 4);
        assert!((cfg.resilience.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(cfg.models.chain_keys().collect::<Vec<_>>(), vec![
            "fast", "slow"
        ]);
        assert_eq!(cfg.models.catalog.len(), 2);
        assert_eq!(cfg.models.get("fast").unwrap().label(), "fast");
        assert_eq!(cfg.sessions.store, SessionStoreKind::File);
        assert_eq!(cfg.knowledge.corpus[0].source_tag, "ground_truth");
    }

    #[test]
    fn api_key_resolution_prefers_inline_value() {
        let mut entry = ModelEntry::new("m", "m", "M", "openai", "SOME_KEY");
        let from_env = entry
            .resolve_api_key_with(|_| Some("  sk-env \n".into()))
            .unwrap();
        assert_eq!(from_env.expose_secret(), "sk-env");
        assert!(entry.resolve_api_key_with(|_| Some("   ".into())).is_none());

        entry.api_key = Some(Secret::new("sk-inline".into()));
        let inline = entry.resolve_api_key_with(|_| None).unwrap();
        assert_eq!(inline.expose_secret(), "sk-inline");
        assert!(!format!("{entry:?}").contains("sk-inline"));
    }
}
