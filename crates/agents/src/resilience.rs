//! Bounded retries with exponential backoff, wrapped in a model fallback chain.
//!
//! [`RetryingProvider`] retries one model configuration. [`FallbackChain`]
//! walks the primary and then each fallback, giving every configuration its
//! own retry budget. Both implement [`LlmProvider`], so callers only ever see
//! a single model.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {
    async_trait::async_trait,
    serde_json::Value,
    tracing::{debug, info, warn},
};

use {
    crate::model::{ChatMessage, CompletionResponse, LlmProvider},
    supportdesk_config::ResilienceConfig,
};

/// Longest single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// How a provider error looks, for log labels only. Every kind is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    RateLimit,
    AuthError,
    ServerError,
    Timeout,
    InvalidRequest,
    Unknown,
}

/// Classify an error by its message.
#[must_use]
pub fn classify_error(err: &anyhow::Error) -> ProviderErrorKind {
    let msg = err.to_string().to_lowercase();

    if msg.contains("timed out") || msg.contains("timeout") {
        return ProviderErrorKind::Timeout;
    }
    if msg.contains("429") || msg.contains("rate limit") || msg.contains("too many requests") {
        return ProviderErrorKind::RateLimit;
    }
    if msg.contains("401")
        || msg.contains("403")
        || msg.contains("unauthorized")
        || msg.contains("invalid api key")
    {
        return ProviderErrorKind::AuthError;
    }
    if ["500", "502", "503", "504", "overloaded", "service unavailable"]
        .iter()
        .any(|p| msg.contains(p))
    {
        return ProviderErrorKind::ServerError;
    }
    if msg.contains("400") || msg.contains("bad request") {
        return ProviderErrorKind::InvalidRequest;
    }
    ProviderErrorKind::Unknown
}

// ── Retry policy ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ResilienceConfig::default())
    }
}

impl From<&ResilienceConfig> for RetryPolicy {
    fn from(cfg: &ResilienceConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            initial_delay: Duration::try_from_secs_f64(cfg.initial_delay_secs)
                .unwrap_or(Duration::ZERO),
            backoff_factor: cfg.backoff_factor,
            attempt_timeout: cfg
                .attempt_timeout_secs
                .and_then(|s| Duration::try_from_secs_f64(s).ok())
                .filter(|d| !d.is_zero()),
        }
    }
}

impl RetryPolicy {
    /// Total attempts per model configuration.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Sleep before retry `retry` (0-based): `initial_delay * backoff_factor^retry`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        match Duration::try_from_secs_f64(secs) {
            Ok(d) => d.min(MAX_BACKOFF),
            Err(_) if secs > 0.0 => MAX_BACKOFF,
            Err(_) => Duration::ZERO,
        }
    }
}

// ── RetryingProvider ────────────────────────────────────────────────────────

/// Retries one model configuration with exponential backoff.
///
/// Retry state lives on the stack of each `complete()` call. The last failure
/// is returned unchanged.
pub struct RetryingProvider {
    inner: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn attempt(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> anyhow::Result<CompletionResponse> {
        match self.policy.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.complete(messages, tools))
                .await
                .unwrap_or_else(|_| {
                    Err(anyhow::anyhow!(
                        "model call timed out after {}ms",
                        limit.as_millis()
                    ))
                }),
            None => self.inner.complete(messages, tools).await,
        }
    }
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn id(&self) -> &str {
        self.inner.id()
    }

    fn supports_tools(&self) -> bool {
        self.inner.supports_tools()
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> anyhow::Result<CompletionResponse> {
        let max_attempts = self.policy.attempts();
        let mut retry = 0;
        loop {
            let attempt = retry + 1;
            let started = Instant::now();
            match self.attempt(messages, tools).await {
                Ok(resp) => {
                    debug!(
                        model = self.inner.id(),
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "model call succeeded"
                    );
                    return Ok(resp);
                },
                Err(e) => {
                    let kind = classify_error(&e);
                    if retry >= self.policy.max_retries {
                        warn!(
                            model = self.inner.id(),
                            attempt,
                            max_attempts,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            kind = ?kind,
                            error = %e,
                            "model call failed, retries exhausted"
                        );
                        return Err(e);
                    }
                    let delay = self.policy.delay_for(retry);
                    warn!(
                        model = self.inner.id(),
                        attempt,
                        max_attempts,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        retry_in_ms = delay.as_millis() as u64,
                        kind = ?kind,
                        error = %e,
                        "model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                },
            }
        }
    }
}

// ── FallbackChain ───────────────────────────────────────────────────────────

/// Attached as context to the last error once every configuration in a
/// [`FallbackChain`] is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("all {configurations} model configurations failed after {attempts} attempts")]
pub struct TerminalModelError {
    pub configurations: usize,
    pub attempts: u32,
}

/// Tries the primary, then each fallback, each behind its own retries.
pub struct FallbackChain {
    entries: Vec<Arc<dyn LlmProvider>>,
    policy: RetryPolicy,
}

impl FallbackChain {
    /// `entries` is primary first, then fallbacks in order.
    pub fn new(entries: Vec<Arc<dyn LlmProvider>>, policy: RetryPolicy) -> Self {
        Self { entries, policy }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Model ids in invocation order.
    pub fn model_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id()).collect()
    }
}

#[async_trait]
impl LlmProvider for FallbackChain {
    fn name(&self) -> &str {
        self.entries.first().map_or("fallback-chain", |p| p.name())
    }

    fn id(&self) -> &str {
        self.entries.first().map_or("none", |p| p.id())
    }

    fn supports_tools(&self) -> bool {
        self.entries.iter().any(|p| p.supports_tools())
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> anyhow::Result<CompletionResponse> {
        let mut last_error = None;

        for (position, entry) in self.entries.iter().enumerate() {
            let retrying = RetryingProvider::new(Arc::clone(entry), self.policy.clone());
            match retrying.complete(messages, tools).await {
                Ok(resp) => {
                    if position > 0 {
                        info!(model = entry.id(), position, "fallback model succeeded");
                    }
                    return Ok(resp);
                },
                Err(e) => {
                    if position + 1 < self.entries.len() {
                        warn!(
                            model = entry.id(),
                            error = %e,
                            "model configuration exhausted, trying next in chain"
                        );
                    }
                    last_error = Some(e);
                },
            }
        }

        let terminal = TerminalModelError {
            configurations: self.entries.len(),
            attempts: u32::try_from(self.entries.len())
                .unwrap_or(u32::MAX)
                .saturating_mul(self.policy.attempts()),
        };
        match last_error {
            Some(e) => {
                warn!(
                    configurations = terminal.configurations,
                    attempts = terminal.attempts,
                    error = %e,
                    "all model configurations failed"
                );
                Err(e.context(terminal))
            },
            None => anyhow::bail!("no model configurations available"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        std::sync::atomic::{AtomicU32, Ordering},
    };

    /// Fails the first `failures` calls, then answers with its id.
    struct FlakyProvider {
        id: &'static str,
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyProvider {
        fn new(id: &'static str, failures: u32) -> Arc<Self> {
            Arc::new(Self {
                id,
                failures,
                calls: AtomicU32::new(0),
            })
        }

        fn always_failing(id: &'static str) -> Arc<Self> {
            Self::new(id, u32::MAX)
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn id(&self) -> &str {
            self.id
        }

        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _tools: &[Value],
        ) -> anyhow::Result<CompletionResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                anyhow::bail!("{} failure #{n}: HTTP 503 service unavailable", self.id)
            }
            Ok(CompletionResponse::text(self.id))
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl LlmProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        fn id(&self) -> &str {
            "slow"
        }

        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _tools: &[Value],
        ) -> anyhow::Result<CompletionResponse> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(CompletionResponse::text("too late"))
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            ..RetryPolicy::default()
        }
    }

    fn chain_of(providers: &[&Arc<FlakyProvider>]) -> Vec<Arc<dyn LlmProvider>> {
        providers
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn LlmProvider>)
            .collect()
    }

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage::user("hello")]
    }

    #[test]
    fn policy_defaults_and_delays() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_retries, 2);
        assert_eq!(p.attempts(), 3);
        assert_eq!(p.delay_for(0), Duration::from_millis(500));
        assert_eq!(p.delay_for(1), Duration::from_secs(1));
        assert_eq!(p.delay_for(2), Duration::from_secs(2));
        assert_eq!(p.delay_for(60), MAX_BACKOFF);
    }

    #[test]
    fn policy_from_config_ignores_invalid_durations() {
        let cfg = ResilienceConfig {
            max_retries: 1,
            initial_delay_secs: -3.0,
            backoff_factor: 2.0,
            attempt_timeout_secs: Some(0.0),
        };
        let p = RetryPolicy::from(&cfg);
        assert_eq!(p.initial_delay, Duration::ZERO);
        assert!(p.attempt_timeout.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let inner = FlakyProvider::new("primary", 2);
        let retrying = RetryingProvider::new(inner.clone(), policy(2));
        let started = tokio::time::Instant::now();
        let resp = retrying.complete(&messages(), &[]).await.unwrap();
        assert_eq!(resp.text.as_deref(), Some("primary"));
        assert_eq!(inner.calls(), 3);
        // 0.5s + 1.0s of backoff
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(1500), "{waited:?}");
        assert!(waited < Duration::from_millis(1600), "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_return_last_error_unchanged() {
        let inner = FlakyProvider::always_failing("primary");
        let retrying = RetryingProvider::new(inner.clone(), policy(2));
        let err = retrying.complete(&messages(), &[]).await.unwrap_err();
        assert_eq!(inner.calls(), 3);
        assert!(err.to_string().starts_with("primary failure #3"));
        assert!(err.downcast_ref::<TerminalModelError>().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_single_attempt() {
        let inner = FlakyProvider::always_failing("primary");
        let retrying = RetryingProvider::new(inner.clone(), policy(0));
        assert!(retrying.complete(&messages(), &[]).await.is_err());
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_timeout_counts_as_failure() {
        let retrying = RetryingProvider::new(Arc::new(SlowProvider), RetryPolicy {
            max_retries: 1,
            attempt_timeout: Some(Duration::from_secs(1)),
            ..RetryPolicy::default()
        });
        let err = retrying.complete(&messages(), &[]).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(classify_error(&err), ProviderErrorKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn chain_falls_back_after_primary_exhausted() {
        let primary = FlakyProvider::always_failing("primary");
        let fallback = FlakyProvider::new("fallback", 0);
        let chain = FallbackChain::new(chain_of(&[&primary, &fallback]), policy(2));
        let resp = chain.complete(&messages(), &[]).await.unwrap();
        assert_eq!(resp.text.as_deref(), Some("fallback"));
        assert_eq!(primary.calls(), 3);
        assert_eq!(fallback.calls(), 1);
        assert_eq!(chain.model_ids(), vec!["primary", "fallback"]);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_gets_its_own_retry_budget() {
        let primary = FlakyProvider::always_failing("primary");
        let fallback = FlakyProvider::new("fallback", 2);
        let chain = FallbackChain::new(chain_of(&[&primary, &fallback]), policy(2));
        assert!(chain.complete(&messages(), &[]).await.is_ok());
        assert_eq!(fallback.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_failure_after_every_configuration() {
        let providers = [
            FlakyProvider::always_failing("a"),
            FlakyProvider::always_failing("b"),
            FlakyProvider::always_failing("c"),
        ];
        let chain = FallbackChain::new(
            chain_of(&[&providers[0], &providers[1], &providers[2]]),
            policy(2),
        );
        let err = chain.complete(&messages(), &[]).await.unwrap_err();

        let total: u32 = providers.iter().map(|p| p.calls()).sum();
        assert_eq!(total, (2 + 1) * (1 + 2));

        let terminal = err.downcast_ref::<TerminalModelError>().unwrap();
        assert_eq!(terminal.configurations, 3);
        assert_eq!(terminal.attempts, 9);
        assert!(err.root_cause().to_string().starts_with("c failure #3"));
    }

    #[tokio::test]
    async fn empty_chain_errors() {
        let chain = FallbackChain::new(vec![], RetryPolicy::default());
        assert!(chain.is_empty());
        assert_eq!(chain.id(), "none");
        assert!(chain.complete(&messages(), &[]).await.is_err());
    }

    #[test]
    fn classify_error_labels() {
        let kind = |m: &str| classify_error(&anyhow::anyhow!("{m}"));
        assert_eq!(kind("API error HTTP 429: slow down"), ProviderErrorKind::RateLimit);
        assert_eq!(kind("HTTP 401 Unauthorized"), ProviderErrorKind::AuthError);
        assert_eq!(kind("502 bad gateway"), ProviderErrorKind::ServerError);
        assert_eq!(kind("HTTP 400 bad request"), ProviderErrorKind::InvalidRequest);
        assert_eq!(kind("connection reset"), ProviderErrorKind::Unknown);
    }
}
