use std::time::Duration;

use anyhow::{Context, Result};

use crate::generation::orchestrator::RetryPolicy;
use crate::layout::PaginationConfig;

const DEFAULT_BASE_URL: &str = "https://api.siliconflow.cn/v1";
const DEFAULT_MODEL: &str = "Qwen/Qwen3-8B";

/// Library configuration loaded from environment variables.
/// Only the API key is required; everything else has a working default.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
    pub max_retries: u32,
    /// Fraction over the base card capacity that still renders as a single, taller card.
    pub extension_allowance: f32,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup (the process env in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Config {
            llm_base_url: get("LLM_BASE_URL", DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            llm_api_key: lookup("LLM_API_KEY")
                .filter(|k| !k.trim().is_empty())
                .context("Required environment variable 'LLM_API_KEY' is not set")?,
            llm_model: get("LLM_MODEL", DEFAULT_MODEL),
            llm_timeout_secs: get("LLM_TIMEOUT_SECS", "60")
                .parse::<u64>()
                .context("LLM_TIMEOUT_SECS must be a whole number of seconds")?,
            max_retries: get("MAX_RETRIES", "3")
                .parse::<u32>()
                .context("MAX_RETRIES must be a non-negative integer")?,
            extension_allowance: parse_allowance(&get("EXTENSION_ALLOWANCE", "1.2"))?,
            rust_log: get("RUST_LOG", "info"),
        })
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            ..RetryPolicy::default()
        }
    }

    pub fn pagination_config(&self) -> PaginationConfig {
        PaginationConfig {
            extension_allowance: self.extension_allowance,
            ..PaginationConfig::default()
        }
    }
}

fn parse_allowance(raw: &str) -> Result<f32> {
    let value = raw
        .parse::<f32>()
        .with_context(|| format!("EXTENSION_ALLOWANCE must be a number, got '{raw}'"))?;
    anyhow::ensure!(
        value >= 1.0,
        "EXTENSION_ALLOWANCE must be at least 1.0, got {value}"
    );
    Ok(value)
}
