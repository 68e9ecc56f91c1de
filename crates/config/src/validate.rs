//! Configuration validation.
//!
//! Reports syntax and type errors in the config file, then semantic problems
//! in the parsed config: impossible backoff values, model keys missing from
//! the catalog, unset API keys, and corpus files that do not exist.

use std::path::{Path, PathBuf};

use crate::schema::{ModelsConfig, SupportdeskConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "type-error", "resilience", "model", "api-key",
    /// "knowledge", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "models.fallbacks[1]"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Validate a config file at the given path, or the discovered default file
/// when `path` is `None`.
#[must_use]
pub fn validate_file(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(actual_path) = config_path else {
        let mut result = validate(&SupportdeskConfig::default());
        result.diagnostics.insert(
            0,
            Diagnostic::new(
                Severity::Info,
                "file-ref",
                "",
                "no config file found; using defaults",
            ),
        );
        return result;
    };

    let mut result = match crate::loader::load_config(&actual_path) {
        Ok(mut config) => {
            crate::loader::apply_env_overrides(&mut config);
            validate(&config)
        },
        Err(e) => {
            let category = if e.to_string().starts_with("failed to read") {
                "file-ref"
            } else {
                "type-error"
            };
            ValidationResult {
                diagnostics: vec![Diagnostic::new(
                    Severity::Error,
                    category,
                    "",
                    format!("{e}"),
                )],
                config_path: None,
            }
        },
    };
    result.config_path = Some(actual_path);
    result
}

/// Semantic checks on an already parsed config.
#[must_use]
pub fn validate(config: &SupportdeskConfig) -> ValidationResult {
    validate_with(config, |name| std::env::var(name).ok())
}

/// Same as [`validate`] with a custom env lookup for API-key checks.
#[must_use]
pub fn validate_with(
    config: &SupportdeskConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> ValidationResult {
    let mut diagnostics = Vec::new();
    check_resilience(config, &mut diagnostics);
    check_models(&config.models, &lookup, &mut diagnostics);
    check_knowledge(config, &mut diagnostics);
    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_resilience(config: &SupportdeskConfig, diagnostics: &mut Vec<Diagnostic>) {
    let r = &config.resilience;
    if r.initial_delay_secs.is_nan() || r.initial_delay_secs < 0.0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "resilience",
            "resilience.initial_delay_secs",
            format!("initial delay must be non-negative, got {}", r.initial_delay_secs),
        ));
    }
    if r.backoff_factor.is_nan() || r.backoff_factor < 1.0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "resilience",
            "resilience.backoff_factor",
            format!("backoff factor must be at least 1.0, got {}", r.backoff_factor),
        ));
    }
    if let Some(t) = r.attempt_timeout_secs
        && (t.is_nan() || t <= 0.0)
    {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "resilience",
            "resilience.attempt_timeout_secs",
            format!("attempt timeout must be positive, got {t}"),
        ));
    }
    if config.agent.max_iterations == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "resilience",
            "agent.max_iterations",
            "agent must be allowed at least one iteration",
        ));
    }
}

fn check_models(
    models: &ModelsConfig,
    lookup: &impl Fn(&str) -> Option<String>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let keys: Vec<&str> = models.catalog.iter().map(|m| m.key.as_str()).collect();

    if models.get(&models.primary).is_none() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "model",
            "models.primary",
            unknown_model_message(&models.primary, &keys),
        ));
    }

    for (i, key) in models.fallbacks.iter().enumerate() {
        if models.get(key).is_none() {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "model",
                format!("models.fallbacks[{i}]"),
                format!("{}; it will be skipped", unknown_model_message(key, &keys)),
            ));
        }
    }

    if let Some(key) = &models.classifier
        && models.get(key).is_none()
    {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "model",
            "models.classifier",
            format!(
                "{}; the offline phrase classifier will be used",
                unknown_model_message(key, &keys)
            ),
        ));
    }

    let referenced = models
        .chain_keys()
        .chain(models.classifier.as_deref())
        .filter_map(|key| models.get(key));
    let mut reported = Vec::new();
    for entry in referenced {
        if reported.contains(&entry.key.as_str()) {
            continue;
        }
        reported.push(entry.key.as_str());
        if entry.resolve_api_key_with(lookup).is_none() {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "api-key",
                format!("models.catalog.{}", entry.key),
                if entry.api_key_env.is_empty() {
                    format!("model '{}' has no api_key or api_key_env", entry.key)
                } else {
                    format!(
                        "model '{}' needs {} which is not set",
                        entry.key, entry.api_key_env
                    )
                },
            ));
        }
    }
}

fn check_knowledge(config: &SupportdeskConfig, diagnostics: &mut Vec<Diagnostic>) {
    let k = &config.knowledge;
    if k.max_top_k == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "knowledge",
            "knowledge.max_top_k",
            "max_top_k must be at least 1",
        ));
    }
    if k.max_features == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "knowledge",
            "knowledge.max_features",
            "max_features must be at least 1",
        ));
    }
    if k.max_ngram == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "knowledge",
            "knowledge.max_ngram",
            "max_ngram must be at least 1",
        ));
    }
    if k.corpus.is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "knowledge",
            "knowledge.corpus",
            "at least one corpus file is required",
        ));
    }
    for (i, source) in k.corpus.iter().enumerate() {
        if !source.path.exists() {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "file-ref",
                format!("knowledge.corpus[{i}].path"),
                format!("corpus file not found: {}", source.path.display()),
            ));
        }
    }
}

fn unknown_model_message(key: &str, known: &[&str]) -> String {
    match suggest(key, known, 3) {
        Some(s) => format!("model '{key}' is not in the catalog (did you mean '{s}'?)"),
        None => format!("model '{key}' is not in the catalog"),
    }
}

// ── Typo suggestions ────────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}
