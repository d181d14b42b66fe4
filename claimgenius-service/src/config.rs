use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context as _, anyhow};

pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_VISION_MODEL: &str = "openai/gpt-4.1-mini";

/// Service settings read from the environment (and `.env`, loaded in `main`).
#[derive(Clone)]
pub struct Config {
    pub openrouter_api_key: String,
    pub model: String,
    pub vision_model: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub policy_docs_dir: PathBuf,
    pub claim_forms_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub llm_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let openrouter_api_key =
            var("OPENROUTER_API_KEY").ok_or_else(|| anyhow!("OPENROUTER_API_KEY not set"))?;

        let max_upload_mb: usize = parse_or(&var, "MAX_UPLOAD_MB", 20)?;
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| anyhow!("invalid value for MAX_UPLOAD_MB: {max_upload_mb} is too large"))?;
        let llm_timeout_secs: u64 = parse_or(&var, "LLM_TIMEOUT_SECS", 120)?;

        Ok(Self {
            openrouter_api_key,
            model: var("CLAIMGENIUS_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            vision_model: var("CLAIMGENIUS_VISION_MODEL")
                .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            port: parse_or(&var, "PORT", 3000)?,
            upload_dir: var("UPLOAD_DIR")
                .unwrap_or_else(|| "uploaded_invoices".to_string())
                .into(),
            policy_docs_dir: var("POLICY_DOCS_DIR")
                .unwrap_or_else(|| "data/policy".to_string())
                .into(),
            claim_forms_dir: var("CLAIM_FORMS_DIR")
                .unwrap_or_else(|| "data/claim_forms".to_string())
                .into(),
            max_upload_bytes,
            llm_timeout: Duration::from_secs(llm_timeout_secs),
        })
    }
}

fn parse_or<T>(var: impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
