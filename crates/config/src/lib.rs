//! Configuration loading and validation for a chatter decorator stack.
//!
//! Loads a TOML file describing default inference options, rate limits,
//! quotas and the default route, with environment variable overrides.
//! Validates all settings at load time.

use chatter_core::Opt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding `limiter.requests_per_minute`.
pub const ENV_RPM: &str = "CHATTER_RPM";
/// Environment variable overriding `limiter.tokens_per_minute`.
pub const ENV_TPM: &str = "CHATTER_TPM";
/// Environment variable overriding `quota.max_epoch`.
pub const ENV_MAX_EPOCH: &str = "CHATTER_MAX_EPOCH";

/// The root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Route selected when the caller names none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_route: Option<String>,

    /// Inference options sent with every call
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Rate limiter; absent means no limiter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limiter: Option<LimiterConfig>,

    /// Quota guard; absent means no quota
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaConfig>,
}

/// Default inference parameters sent with every call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

/// Token-bucket limits. Zero disables a bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    #[serde(default)]
    pub requests_per_minute: u32,

    #[serde(default)]
    pub tokens_per_minute: u32,
}

/// Lifetime ceilings. Zero disables a ceiling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default)]
    pub max_epoch: u64,

    #[serde(default)]
    pub max_input_tokens: u64,

    #[serde(default)]
    pub max_reply_tokens: u64,
}

impl StackConfig {
    /// Load configuration from a file, then apply environment overrides:
    /// - `CHATTER_RPM`
    /// - `CHATTER_TPM`
    /// - `CHATTER_MAX_EPOCH`
    pub fn load_from_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(rpm) = parse_override::<u32>(&lookup, ENV_RPM)? {
            self.limiter.get_or_insert_with(LimiterConfig::default).requests_per_minute = rpm;
        }

        if let Some(tpm) = parse_override::<u32>(&lookup, ENV_TPM)? {
            self.limiter.get_or_insert_with(LimiterConfig::default).tokens_per_minute = tpm;
        }

        if let Some(epoch) = parse_override::<u64>(&lookup, ENV_MAX_EPOCH)? {
            self.quota.get_or_insert_with(QuotaConfig::default).max_epoch = epoch;
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(t) = self.inference.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "inference.temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if let Some(p) = self.inference.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::ValidationError(
                    "inference.top_p must be between 0.0 and 1.0".into(),
                ));
            }
        }

        if let Some(k) = self.inference.top_k {
            if k < 0.0 {
                return Err(ConfigError::ValidationError(
                    "inference.top_k must not be negative".into(),
                ));
            }
        }

        if let Some(route) = &self.default_route {
            if route.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "default_route must not be blank".into(),
                ));
            }
        }

        Ok(())
    }

    /// Options to send with every call, in a stable order.
    pub fn options(&self) -> Vec<Opt> {
        let inference = &self.inference;
        let mut opts = Vec::new();

        if let Some(t) = inference.temperature {
            opts.push(Opt::Temperature(t));
        }
        if let Some(p) = inference.top_p {
            opts.push(Opt::TopP(p));
        }
        if let Some(k) = inference.top_k {
            opts.push(Opt::TopK(k));
        }
        if let Some(n) = inference.max_tokens {
            opts.push(Opt::MaxTokens(n));
        }
        if !inference.stop_sequences.is_empty() {
            opts.push(Opt::StopSequences(inference.stop_sequences.clone()));
        }
        if let Some(route) = &self.default_route {
            opts.push(Opt::Route(route.clone()));
        }

        opts
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

fn parse_override<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };

    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::ValidationError(format!("{key}={raw:?} is invalid: {e}")))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
