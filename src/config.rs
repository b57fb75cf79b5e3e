//! Environment configuration.
//!
//! Recognized keys and defaults per the external-interfaces spec. Loaded once
//! at process start and handed to the request context as a cheap `Arc<Config>`.

use std::collections::HashSet;
use std::env;
use std::sync::Arc;

use crate::error::{KbError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub data_root: String,
    pub index_root: String,
    pub api_keys: HashSet<String>,
    pub embed_account: Option<String>,
    pub embed_token: Option<String>,
    pub embed_model: String,
    pub cache_budget_bytes: u64,
}

/// Default byte budget for the range-fetch LRU and row-group LRU combined.
pub const DEFAULT_CACHE_BUDGET_BYTES: u64 = 256 * 1024 * 1024;

/// Models accepted for `EMBED_MODEL`, per §6.
pub const SUPPORTED_EMBED_MODELS: &[&str] = &["bge-m3", "bge-base", "gemma300"];

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// `DATA_ROOT` is required; everything else has a documented default.
    pub fn from_env() -> Result<Self> {
        let data_root = env::var("DATA_ROOT")
            .map_err(|_| KbError::invalid_argument("DATA_ROOT is required"))?;

        let index_root = env::var("INDEX_ROOT")
            .unwrap_or_else(|_| format!("{}/indexes", data_root.trim_end_matches('/')));

        let api_keys = env::var("API_KEYS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let embed_account = env::var("EMBED_ACCOUNT").ok();
        let embed_token = env::var("EMBED_TOKEN").ok();

        let embed_model = env::var("EMBED_MODEL").unwrap_or_else(|_| "bge-m3".to_string());
        if !SUPPORTED_EMBED_MODELS.contains(&embed_model.as_str()) {
            return Err(KbError::invalid_argument(format!(
                "unsupported EMBED_MODEL '{embed_model}', expected one of {SUPPORTED_EMBED_MODELS:?}"
            )));
        }

        let cache_budget_bytes = env::var("CACHE_BUDGET_BYTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CACHE_BUDGET_BYTES);

        Ok(Config {
            data_root,
            index_root,
            api_keys,
            embed_account,
            embed_token,
            embed_model,
            cache_budget_bytes,
        })
    }

    /// True when direct-call embedding credentials are present; otherwise the
    /// public gateway endpoint is used (§6).
    pub fn has_direct_embed_credentials(&self) -> bool {
        self.embed_account.is_some() && self.embed_token.is_some()
    }

    pub fn is_valid_api_key(&self, key: &str) -> bool {
        self.api_keys.contains(key)
    }

    pub fn into_shared(self) -> Arc<Config> {
        Arc::new(self)
    }
}
