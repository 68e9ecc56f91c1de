//! Configuration loading, env substitution, env overrides, and validation.
//!
//! Config files: `supportdesk.toml`, `supportdesk.yaml`, or `supportdesk.json`
//! Searched in `./` then the user config directory.
//!
//! Supports `${ENV_VAR}` substitution anywhere in the file text.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        apply_env_overrides, apply_env_overrides_with, config_dir, data_dir, discover_and_load,
        find_config_file, load_config,
    },
    schema::{
        AgentConfig, CorpusSource, EscalationConfig, KnowledgeConfig, ModelEntry, ModelsConfig,
        ResilienceConfig, SessionStoreKind, SessionsConfig, SupportdeskConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_file},
};
