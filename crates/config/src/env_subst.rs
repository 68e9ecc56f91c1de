use std::{borrow::Cow, sync::LazyLock};

use regex::{Captures, Regex};

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex should compile")
});

/// Replace `${ENV_VAR}` placeholders in raw config text.
///
/// Unresolvable variables are left as-is so validation can point at them.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

/// Same as [`substitute_env`] with a custom lookup, so tests never touch the
/// process environment.
pub fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let replaced: Cow<'_, str> = PLACEHOLDER.replace_all(input, |caps: &Captures<'_>| {
        lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });
    replaced.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "OPENAI_KEY_ENV" => Some("OPENAI_API_KEY".to_string()),
            "CORPUS_DIR" => Some("/srv/kb".to_string()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_vars() {
        assert_eq!(
            substitute_env_with("path = \"${CORPUS_DIR}/faq.jsonl\"", lookup),
            "path = \"/srv/kb/faq.jsonl\""
        );
        assert_eq!(
            substitute_env_with("${OPENAI_KEY_ENV} ${CORPUS_DIR}", lookup),
            "OPENAI_API_KEY /srv/kb"
        );
    }

    #[test]
    fn leaves_unknown_and_malformed_placeholders() {
        assert_eq!(substitute_env_with("${NOPE_XYZ}", lookup), "${NOPE_XYZ}");
        assert_eq!(substitute_env_with("${CORPUS_DIR", lookup), "${CORPUS_DIR");
        assert_eq!(substitute_env_with("cost: $5", lookup), "cost: $5");
    }
}
