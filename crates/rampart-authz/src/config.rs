//! Enforcer configuration sourced from environment variables.

use serde::{Deserialize, Serialize};

use crate::errors::{AuthzError, AuthzResult};

/// Selects the matcher strategy: `expression` or `fastpath`.
pub const STRATEGY_ENV: &str = "RAMPART_ENFORCER_STRATEGY";
/// Enables the batch-optimized path; disabling falls back to naive
/// per-item enforcement.
pub const BATCH_ENFORCE_ENV: &str = "RAMPART_BATCH_ENFORCE";

/// Which evaluation strategy the enforcer runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherStrategy {
    /// Interpret the compiled matcher expression per row and item.
    #[default]
    Expression,
    /// Fixed-shape `[sub, res, act, obj, eft]` comparison, no expression
    /// evaluation. Requires a compatible model.
    FastPath,
}

impl MatcherStrategy {
    pub fn parse(raw: &str) -> AuthzResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "expression" => Ok(MatcherStrategy::Expression),
            "fastpath" => Ok(MatcherStrategy::FastPath),
            _ => Err(AuthzError::UnknownStrategy(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcerConfig {
    #[serde(default)]
    pub strategy: MatcherStrategy,
    #[serde(default = "default_batch_enabled")]
    pub batch_enabled: bool,
}

fn default_batch_enabled() -> bool {
    true
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            strategy: MatcherStrategy::default(),
            batch_enabled: true,
        }
    }
}

impl EnforcerConfig {
    /// Read the configuration from the environment. Unset variables keep
    /// their defaults; unparseable values are configuration errors, never
    /// silently defaulted.
    pub fn from_env() -> AuthzResult<Self> {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(STRATEGY_ENV) {
            config.strategy = MatcherStrategy::parse(&value)?;
        }
        if let Ok(value) = std::env::var(BATCH_ENFORCE_ENV) {
            config.batch_enabled = parse_bool_flag(BATCH_ENFORCE_ENV, &value)?;
        }
        Ok(config)
    }
}

fn parse_bool_flag(name: &str, value: &str) -> AuthzResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(AuthzError::InvalidFlag {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_expression_with_batching() {
        let config = EnforcerConfig::default();
        assert_eq!(config.strategy, MatcherStrategy::Expression);
        assert!(config.batch_enabled);
    }

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!(
            MatcherStrategy::parse("FastPath").expect("strategy"),
            MatcherStrategy::FastPath
        );
        assert_eq!(
            MatcherStrategy::parse(" expression ").expect("strategy"),
            MatcherStrategy::Expression
        );
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let err = MatcherStrategy::parse("regex").expect_err("strategy");
        assert!(matches!(err, AuthzError::UnknownStrategy(value) if value == "regex"));
    }

    #[test]
    fn bool_flag_accepts_common_spellings() {
        for value in ["1", "true", "YES"] {
            assert!(parse_bool_flag(BATCH_ENFORCE_ENV, value).expect("flag"));
        }
        for value in ["0", "false", "no"] {
            assert!(!parse_bool_flag(BATCH_ENFORCE_ENV, value).expect("flag"));
        }
    }

    #[test]
    fn malformed_bool_flag_is_rejected() {
        let err = parse_bool_flag(BATCH_ENFORCE_ENV, "maybe").expect_err("flag");
        assert!(matches!(err, AuthzError::InvalidFlag { value, .. } if value == "maybe"));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: EnforcerConfig = serde_json::from_str("{}").expect("decode");
        assert_eq!(config, EnforcerConfig::default());

        let config: EnforcerConfig =
            serde_json::from_str(r#"{"strategy": "fastpath", "batch_enabled": false}"#)
                .expect("decode");
        assert_eq!(config.strategy, MatcherStrategy::FastPath);
        assert!(!config.batch_enabled);
    }

    // Environment access is process-global, so everything env-driven lives
    // in this single test.
    #[test]
    fn from_env_reads_both_variables() {
        std::env::set_var(STRATEGY_ENV, "fastpath");
        std::env::set_var(BATCH_ENFORCE_ENV, "false");
        let config = EnforcerConfig::from_env().expect("config");
        assert_eq!(config.strategy, MatcherStrategy::FastPath);
        assert!(!config.batch_enabled);

        std::env::set_var(STRATEGY_ENV, "regex");
        assert!(EnforcerConfig::from_env().is_err());

        std::env::remove_var(STRATEGY_ENV);
        std::env::remove_var(BATCH_ENFORCE_ENV);
        let config = EnforcerConfig::from_env().expect("config");
        assert_eq!(config, EnforcerConfig::default());
    }
}
