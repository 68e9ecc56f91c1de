use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::SupportdeskConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "supportdesk.toml",
    "supportdesk.yaml",
    "supportdesk.yml",
    "supportdesk.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<SupportdeskConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, then apply env overrides.
///
/// Search order:
/// 1. `./supportdesk.{toml,yaml,yml,json}` (project-local)
/// 2. `<user config dir>/supportdesk.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to `SupportdeskConfig::default()` if no file is found or the
/// file fails to parse.
pub fn discover_and_load() -> SupportdeskConfig {
    let mut config = if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                SupportdeskConfig::default()
            },
        }
    } else {
        debug!("no config file found, using defaults");
        SupportdeskConfig::default()
    };
    apply_env_overrides(&mut config);
    config
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (e.g. `~/.config/supportdesk/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "supportdesk").map(|d| d.config_dir().to_path_buf())
}

/// Returns the user data directory used by the file session store.
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "supportdesk").map(|d| d.data_dir().to_path_buf())
}

/// Apply `SUPPORTDESK_*` (and legacy `MODEL_MAX_RETRIES`) environment overrides.
pub fn apply_env_overrides(config: &mut SupportdeskConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

/// Same as [`apply_env_overrides`] with a custom lookup.
///
/// Unparseable values are ignored with a warning.
pub fn apply_env_overrides_with(
    config: &mut SupportdeskConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let retries = lookup("SUPPORTDESK_MAX_RETRIES").or_else(|| lookup("MODEL_MAX_RETRIES"));
    if let Some(raw) = retries {
        match raw.trim().parse::<u32>() {
            Ok(v) => config.resilience.max_retries = v,
            Err(e) => warn!(value = %raw, error = %e, "ignoring invalid max retries override"),
        }
    }

    if let Some(raw) = lookup("SUPPORTDESK_INITIAL_DELAY_SECS") {
        match raw.trim().parse::<f64>() {
            Ok(v) => config.resilience.initial_delay_secs = v,
            Err(e) => warn!(value = %raw, error = %e, "ignoring invalid initial delay override"),
        }
    }

    if let Some(raw) = lookup("SUPPORTDESK_BACKOFF_FACTOR") {
        match raw.trim().parse::<f64>() {
            Ok(v) => config.resilience.backoff_factor = v,
            Err(e) => warn!(value = %raw, error = %e, "ignoring invalid backoff factor override"),
        }
    }

    if let Some(raw) = lookup("SUPPORTDESK_FALLBACK_MODELS") {
        config.models.fallbacks = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<SupportdeskConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn loads_each_supported_format() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("supportdesk.toml");
        std::fs::write(&toml_path, "[agent]\nmax_iterations = 7\n").unwrap();
        assert_eq!(load_config(&toml_path).unwrap().agent.max_iterations, 7);

        let yaml_path = dir.path().join("supportdesk.yaml");
        std::fs::write(&yaml_path, "knowledge:\n  max_top_k: 3\n").unwrap();
        assert_eq!(load_config(&yaml_path).unwrap().knowledge.max_top_k, 3);

        let json_path = dir.path().join("supportdesk.json");
        std::fs::write(&json_path, r#"{"escalation": {"enabled": false}}"#).unwrap();
        assert!(!load_config(&json_path).unwrap().escalation.enabled);

        let bad = dir.path().join("supportdesk.ini");
        std::fs::write(&bad, "x=1").unwrap();
        assert!(load_config(&bad).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = SupportdeskConfig::default();
        apply_env_overrides_with(&mut cfg, |name| match name {
            "MODEL_MAX_RETRIES" => Some("5".into()),
            "SUPPORTDESK_INITIAL_DELAY_SECS" => Some("0.25".into()),
            "SUPPORTDESK_BACKOFF_FACTOR" => Some("3".into()),
            "SUPPORTDESK_FALLBACK_MODELS" => Some("claude-haiku, ,gpt-5-nano".into()),
            _ => None,
        });
        assert_eq!(cfg.resilience.max_retries, 5);
        assert!((cfg.resilience.initial_delay_secs - 0.25).abs() < f64::EPSILON);
        assert!((cfg.resilience.backoff_factor - 3.0).abs() < f64::EPSILON);
        assert_eq!(cfg.models.fallbacks, vec!["claude-haiku", "gpt-5-nano"]);
    }

    #[test]
    fn supportdesk_prefix_wins_and_garbage_is_ignored() {
        let mut cfg = SupportdeskConfig::default();
        apply_env_overrides_with(&mut cfg, |name| match name {
            "SUPPORTDESK_MAX_RETRIES" => Some("1".into()),
            "MODEL_MAX_RETRIES" => Some("9".into()),
            "SUPPORTDESK_BACKOFF_FACTOR" => Some("fast".into()),
            _ => None,
        });
        assert_eq!(cfg.resilience.max_retries, 1);
        assert!((cfg.resilience.backoff_factor - 2.0).abs() < f64::EPSILON);
    }
}
