//! Runtime configuration loaded from the environment.

use anyhow::{Context, Result};
use std::net::SocketAddr;

use crate::model::openrouter::DEFAULT_MODEL;
use crate::schema::DEFAULT_CURRENCY;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_LANGUAGE: &str = "Danish";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Listing sites reject requests without a browser user agent.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub openrouter_api_key: String,
    pub model: String,
    pub prompt: PromptSettings,
    pub max_upload_bytes: usize,
    pub fetch_user_agent: String,
    /// `None` runs against the in-memory store.
    pub supabase: Option<SupabaseConfig>,
}

/// Settings interpolated into the extraction and comparison prompts.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSettings {
    /// Language of all narrative text in reports.
    pub language: String,
    pub currency: String,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: String,
}

impl AppConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("BIND_ADDR is not a valid socket address")?;

        let openrouter_api_key =
            get("OPENROUTER_API_KEY").context("OPENROUTER_API_KEY environment variable not set")?;

        let max_upload_bytes = match get("MAX_UPLOAD_BYTES") {
            Some(v) => v
                .parse()
                .with_context(|| format!("MAX_UPLOAD_BYTES is not a number: {}", v))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let supabase = match (get("SUPABASE_URL"), get("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_role_key)) => Some(SupabaseConfig {
                url: url.trim_end_matches('/').to_string(),
                service_role_key,
            }),
            (None, None) => None,
            _ => anyhow::bail!("SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY must be set together"),
        };

        let defaults = PromptSettings::default();

        Ok(Self {
            bind_addr,
            openrouter_api_key,
            model: get("MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            prompt: PromptSettings {
                language: get("REPORT_LANGUAGE").unwrap_or(defaults.language),
                currency: get("REPORT_CURRENCY").unwrap_or(defaults.currency),
            },
            max_upload_bytes,
            fetch_user_agent: get("FETCH_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            supabase,
        })
    }
}
