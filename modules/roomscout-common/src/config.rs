use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

use crate::types::ValidationMode;

/// Application configuration loaded from environment variables.
/// Secrets and env-specific values only; the pipeline tunables have defaults
/// matching the production rollout.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // AI / LLM
    pub openrouter_api_key: String,
    pub openrouter_chat_model: String,
    pub extraction_temperature: f32,
    pub extraction_json_schema: bool,

    // Scraping
    pub apify_api_token: Option<String>,

    // Web server
    pub api_host: String,
    pub api_port: u16,

    // Pipeline
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub validation_mode: ValidationMode,
    pub webhook_deadline_secs: Option<u64>,
    pub default_city: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.log_keys();
        Ok(config)
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| get(key).ok_or_else(|| anyhow!("{key} environment variable is required"));

        let config = Self {
            database_url: required("DATABASE_URL")?,
            openrouter_api_key: required("OPENROUTER_API_KEY")?,
            openrouter_chat_model: get("OPENROUTER_CHAT_MODEL")
                .unwrap_or_else(|| "openai/gpt-4o-mini".to_string()),
            extraction_temperature: parse_or(get("EXTRACTION_TEMPERATURE"), "EXTRACTION_TEMPERATURE", 0.3)?,
            extraction_json_schema: parse_or(get("EXTRACTION_JSON_SCHEMA"), "EXTRACTION_JSON_SCHEMA", false)?,
            apify_api_token: get("APIFY_API_TOKEN"),
            api_host: get("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            api_port: parse_or(get("API_PORT"), "API_PORT", 3000)?,
            batch_size: parse_or(get("BATCH_SIZE"), "BATCH_SIZE", 3)?,
            batch_delay_ms: parse_or(get("BATCH_DELAY"), "BATCH_DELAY", 2000)?,
            max_retries: parse_or(get("MAX_RETRIES"), "MAX_RETRIES", 3)?,
            retry_base_delay_ms: parse_or(get("RETRY_BASE_DELAY"), "RETRY_BASE_DELAY", 2000)?,
            validation_mode: match get("VALIDATION_MODE") {
                Some(raw) => raw.parse().map_err(|e: String| anyhow!("VALIDATION_MODE: {e}"))?,
                None => ValidationMode::default(),
            },
            webhook_deadline_secs: get("WEBHOOK_DEADLINE_SECS")
                .map(|raw| {
                    raw.parse()
                        .with_context(|| format!("WEBHOOK_DEADLINE_SECS must be a number, got {raw:?}"))
                })
                .transpose()?,
            default_city: get("DEFAULT_CITY").unwrap_or_else(|| "Hà Nội".to_string()),
        };

        if config.batch_size == 0 {
            return Err(anyhow!("BATCH_SIZE must be at least 1"));
        }

        Ok(config)
    }

    /// Print every key with secrets cut to a short prefix.
    pub fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let head: String = val.chars().take(5).collect();
            format!("{}...({} chars)", head, val.chars().count())
        }
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) => preview(v),
                None => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  DATABASE_URL: {}", preview(&self.database_url));
        tracing::info!("  OPENROUTER_API_KEY: {}", preview(&self.openrouter_api_key));
        tracing::info!("  OPENROUTER_CHAT_MODEL: {}", self.openrouter_chat_model);
        tracing::info!("  APIFY_API_TOKEN: {}", preview_opt(&self.apify_api_token));
        tracing::info!(
            "  batch: size={} delay={}ms retries={} base_delay={}ms mode={:?}",
            self.batch_size,
            self.batch_delay_ms,
            self.max_retries,
            self.retry_base_delay_ms,
            self.validation_mode,
        );
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("{key} must be a valid value, got {raw:?}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("DATABASE_URL", "postgres://localhost/roomscout"),
        ("OPENROUTER_API_KEY", "sk-or-test"),
    ];

    #[test]
    fn defaults_apply_when_only_required_keys_set() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.openrouter_chat_model, "openai/gpt-4o-mini");
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.batch_delay_ms, 2000);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_base_delay_ms, 2000);
        assert_eq!(config.api_port, 3000);
        assert_eq!(config.validation_mode, ValidationMode::Lenient);
        assert!(!config.extraction_json_schema);
        assert!(config.apify_api_token.is_none());
        assert!(config.webhook_deadline_secs.is_none());
        assert_eq!(config.default_city, "Hà Nội");
    }

    #[test]
    fn missing_required_key_is_an_error() {
        let err = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://x")])).unwrap_err();
        assert!(err.to_string().contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn blank_value_counts_as_unset() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("APIFY_API_TOKEN", "   "));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert!(config.apify_api_token.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("BATCH_SIZE", "5"),
            ("VALIDATION_MODE", "strict"),
            ("WEBHOOK_DEADLINE_SECS", "55"),
            ("EXTRACTION_JSON_SCHEMA", "true"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.validation_mode, ValidationMode::Strict);
        assert_eq!(config.webhook_deadline_secs, Some(55));
        assert!(config.extraction_json_schema);
    }

    #[test]
    fn unparseable_number_is_an_error() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("API_PORT", "eighty"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("API_PORT"));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("BATCH_SIZE", "0"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }
}
