use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};

use crate::automation::pipeline::DEFAULT_MATCH_THRESHOLD;
use crate::job_board::HhSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Claude,
    OpenAi,
}

impl FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(LlmProvider::Claude),
            "openai" => Ok(LlmProvider::OpenAi),
            other => Err(anyhow!("Unknown LLM_PROVIDER '{other}' (expected claude or openai)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres { database_url: String },
    Memory,
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreBackend,
    pub hh: HhSettings,
    pub llm_provider: LlmProvider,
    pub llm_api_key: String,
    /// Inclusive score at which a vacancy is recommended and gets a tailored resume.
    pub match_threshold: f64,
    /// Overwrite listing fields of already-cached vacancies on re-ingest.
    pub refresh_vacancies_on_upsert: bool,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("Required environment variable '{key}' is not set"))
        };
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let store = match or_default("STORE_BACKEND", "postgres").trim() {
            "postgres" => StoreBackend::Postgres {
                database_url: require("DATABASE_URL")?,
            },
            "memory" => StoreBackend::Memory,
            other => bail!("Unknown STORE_BACKEND '{other}' (expected postgres or memory)"),
        };

        let llm_provider: LlmProvider = or_default("LLM_PROVIDER", "claude").parse()?;
        let llm_api_key = match llm_provider {
            LlmProvider::Claude => require("ANTHROPIC_API_KEY")?,
            LlmProvider::OpenAi => require("OPENAI_API_KEY")?,
        };

        let match_threshold = match lookup("MATCH_SCORE_THRESHOLD") {
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .context("MATCH_SCORE_THRESHOLD must be a number")?,
            None => DEFAULT_MATCH_THRESHOLD,
        };
        if !(0.0..=100.0).contains(&match_threshold) {
            bail!("MATCH_SCORE_THRESHOLD must be between 0 and 100, got {match_threshold}");
        }

        Ok(Config {
            store,
            hh: HhSettings {
                api_url: or_default("HH_API_URL", "https://api.hh.ru"),
                oauth_url: or_default("HH_OAUTH_URL", "https://hh.ru/oauth"),
                client_id: require("HH_CLIENT_ID")?,
                client_secret: require("HH_CLIENT_SECRET")?,
                redirect_uri: or_default(
                    "HH_REDIRECT_URI",
                    "http://localhost:8080/api/v1/auth/hh/callback",
                ),
            },
            llm_provider,
            llm_api_key,
            match_threshold,
            refresh_vacancies_on_upsert: parse_bool(&or_default("VACANCY_REFRESH_ON_UPSERT", "false"))
                .context("VACANCY_REFRESH_ON_UPSERT must be true or false")?,
            port: or_default("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: or_default("RUST_LOG", "info"),
        })
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(anyhow!("'{other}' is not a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/jobpilot"),
        ("HH_CLIENT_ID", "id"),
        ("HH_CLIENT_SECRET", "secret"),
        ("ANTHROPIC_API_KEY", "sk-ant"),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(BASE)).unwrap();
        assert_eq!(config.llm_provider, LlmProvider::Claude);
        assert_eq!(config.llm_api_key, "sk-ant");
        assert_eq!(config.match_threshold, 60.0);
        assert!(!config.refresh_vacancies_on_upsert);
        assert_eq!(config.port, 8080);
        assert_eq!(config.hh.api_url, "https://api.hh.ru");
        assert!(matches!(config.store, StoreBackend::Postgres { .. }));
    }

    #[test]
    fn test_openai_requires_its_own_key() {
        let mut pairs = BASE.to_vec();
        pairs.push(("LLM_PROVIDER", "openai"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        pairs.push(("OPENAI_API_KEY", "sk-oai"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.llm_provider, LlmProvider::OpenAi);
        assert_eq!(config.llm_api_key, "sk-oai");
    }

    #[test]
    fn test_memory_store_needs_no_database_url() {
        let pairs: Vec<_> = BASE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "DATABASE_URL")
            .chain([("STORE_BACKEND", "memory")])
            .collect();
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.store, StoreBackend::Memory);
    }

    #[test]
    fn test_threshold_and_refresh_overrides() {
        let mut pairs = BASE.to_vec();
        pairs.push(("MATCH_SCORE_THRESHOLD", "75"));
        pairs.push(("VACANCY_REFRESH_ON_UPSERT", "true"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.match_threshold, 75.0);
        assert!(config.refresh_vacancies_on_upsert);
    }

    #[test]
    fn test_threshold_out_of_range_is_rejected() {
        let mut pairs = BASE.to_vec();
        pairs.push(("MATCH_SCORE_THRESHOLD", "120"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_missing_client_id_is_reported() {
        let pairs: Vec<_> = BASE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "HH_CLIENT_ID")
            .collect();
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("HH_CLIENT_ID"));
    }
}
