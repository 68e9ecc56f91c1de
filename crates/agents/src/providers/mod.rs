pub mod openai_compat;
pub mod phrase;

use std::sync::Arc;

use {
    supportdesk_config::{ModelEntry, ModelsConfig},
    tracing::{info, warn},
};

use crate::{
    model::LlmProvider,
    resilience::{FallbackChain, RetryPolicy},
};

pub use {openai_compat::OpenAiCompatProvider, phrase::PhraseIntentModel};

/// Shared HTTP client for model providers.
///
/// Reused so every provider shares one connection pool.
pub fn shared_http_client() -> &'static reqwest::Client {
    static CLIENT: std::sync::LazyLock<reqwest::Client> =
        std::sync::LazyLock::new(reqwest::Client::new);
    &CLIENT
}

/// Default OpenAI-compatible base URL for a provider family.
#[must_use]
pub fn default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("https://api.openai.com/v1"),
        "xai" => Some("https://api.x.ai/v1"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "anthropic" => Some("https://api.anthropic.com/v1"),
        "google" => Some("https://generativelanguage.googleapis.com/v1beta/openai"),
        _ => None,
    }
}

/// Build a provider for one catalog entry with an explicit key lookup.
pub fn build_provider_with(
    entry: &ModelEntry,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let Some(api_key) = entry.resolve_api_key_with(lookup) else {
        anyhow::bail!(
            "model '{}' has no API key (set {})",
            entry.key,
            if entry.api_key_env.is_empty() {
                "api_key"
            } else {
                entry.api_key_env.as_str()
            }
        );
    };
    let base_url = match (&entry.base_url, default_base_url(&entry.provider)) {
        (Some(url), _) => url.clone(),
        (None, Some(url)) => url.to_string(),
        (None, None) => anyhow::bail!(
            "model '{}' uses provider '{}' which needs an explicit base_url",
            entry.key,
            entry.provider
        ),
    };
    Ok(Arc::new(OpenAiCompatProvider::new(
        api_key,
        entry.id.clone(),
        base_url,
        entry.provider.clone(),
    )))
}

/// Build a provider for one catalog entry, reading its key from the environment.
pub fn build_provider(entry: &ModelEntry) -> anyhow::Result<Arc<dyn LlmProvider>> {
    build_provider_with(entry, |name| std::env::var(name).ok())
}

/// Build the agent's model chain: primary first, then fallbacks.
///
/// Entries that are missing from the catalog or lack an API key are skipped
/// with a warning. Fails only when nothing usable remains.
pub fn build_model_chain_with(
    models: &ModelsConfig,
    policy: RetryPolicy,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<FallbackChain> {
    let mut entries: Vec<Arc<dyn LlmProvider>> = Vec::new();
    let mut labels = Vec::new();
    for key in models.chain_keys() {
        let Some(entry) = models.get(key) else {
            warn!(model = key, "model not in catalog, skipping");
            continue;
        };
        match build_provider_with(entry, &lookup) {
            Ok(provider) => {
                entries.push(provider);
                labels.push(entry.label().to_string());
            },
            Err(e) => warn!(model = key, error = %e, "model unavailable, skipping"),
        }
    }
    if entries.is_empty() {
        anyhow::bail!(
            "no usable model configuration (primary '{}', {} fallbacks)",
            models.primary,
            models.fallbacks.len()
        );
    }
    info!(chain = %labels.join(" -> "), "model chain ready");
    Ok(FallbackChain::new(entries, policy))
}

pub fn build_model_chain(
    models: &ModelsConfig,
    policy: RetryPolicy,
) -> anyhow::Result<FallbackChain> {
    build_model_chain_with(models, policy, |name| std::env::var(name).ok())
}

/// Build the escalation classifier, falling back to [`PhraseIntentModel`]
/// when no classifier is configured or it cannot be built.
pub fn build_classifier_with(
    models: &ModelsConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Arc<dyn LlmProvider> {
    let Some(key) = models.classifier.as_deref() else {
        return Arc::new(PhraseIntentModel);
    };
    let built = models
        .get(key)
        .ok_or_else(|| anyhow::anyhow!("classifier model '{key}' not in catalog"))
        .and_then(|entry| build_provider_with(entry, lookup));
    match built {
        Ok(provider) => provider,
        Err(e) => {
            warn!(error = %e, "classifier model unavailable, using phrase classifier");
            Arc::new(PhraseIntentModel)
        },
    }
}

pub fn build_classifier(models: &ModelsConfig) -> Arc<dyn LlmProvider> {
    build_classifier_with(models, |name| std::env::var(name).ok())
}
