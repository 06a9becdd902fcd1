use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::RetryPolicy;
use crate::error::{ReasonerError, Result};
use crate::pipeline::PipelineSettings;
use crate::safety::SafetyPolicy;
use crate::sql::SqlDialect;

/// Environment variable consulted when no Gemini key is configured
pub const GEMINI_API_KEY_VAR: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    Ollama,
    /// Rule-based generator, no network access
    Offline,
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(Provider::Gemini),
            "ollama" => Ok(Provider::Ollama),
            "offline" | "mock" => Ok(Provider::Offline),
            other => Err(format!(
                "unknown provider '{}' (expected gemini, ollama or offline)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: Provider,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            api_key: None,
            base_url: None,
            temperature: 0.1,
            max_output_tokens: 1024,
        }
    }
}

impl LlmSettings {
    /// Configured model, or the provider's default
    pub fn model(&self) -> &str {
        match (&self.model, self.provider) {
            (Some(model), _) => model,
            (None, Provider::Gemini) => aether_llm_sdk::models::gemini::DEFAULT_MODEL,
            (None, Provider::Ollama) => aether_llm_sdk::models::ollama::DEFAULT_MODEL,
            (None, Provider::Offline) => "rules",
        }
    }

    /// Configured key, else `GEMINI_API_KEY`; empty keys count as missing
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(GEMINI_API_KEY_VAR).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    pub dialect: SqlDialect,
    pub max_schema_prompt_chars: usize,
    pub confidence_threshold: f64,
    pub destructive_confidence_ceiling: f64,
    pub allow_destructive: bool,
    pub retry_attempts: u32,
    pub request_timeout_seconds: f64,
    pub retry_backoff_millis: u64,
    pub max_retry_backoff_millis: u64,
    pub llm: LlmSettings,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            dialect: SqlDialect::Mysql,
            max_schema_prompt_chars: crate::prompt::DEFAULT_MAX_SCHEMA_CHARS,
            confidence_threshold: 0.85,
            destructive_confidence_ceiling: 0.5,
            allow_destructive: false,
            retry_attempts: 3,
            request_timeout_seconds: 30.0,
            retry_backoff_millis: 500,
            max_retry_backoff_millis: 8000,
            llm: LlmSettings::default(),
        }
    }
}

impl ReasonerConfig {
    /// Load from a TOML file and `AETHER_*` environment variables.
    ///
    /// An explicit path must exist; the default location
    /// (`<config dir>/aetherdb/reasoner.toml`) is optional. Nested keys use
    /// a double underscore, e.g. `AETHER_LLM__PROVIDER=ollama`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(
            path,
            Environment::with_prefix("AETHER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
    }

    fn load_with_env(path: Option<&Path>, environment: Environment) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path.to_path_buf()).required(true),
            None => File::from(default_config_path()).required(false),
        };

        let config: ReasonerConfig = Config::builder()
            .add_source(file)
            .add_source(environment)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ReasonerError::configuration(e.to_string()))?;

        tracing::debug!(?config.dialect, provider = ?config.llm.provider, "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ReasonerError::configuration(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )))
            }
        };
        unit("confidence_threshold", self.confidence_threshold)?;
        unit(
            "destructive_confidence_ceiling",
            self.destructive_confidence_ceiling,
        )?;

        if self.retry_attempts == 0 {
            return Err(ReasonerError::configuration(
                "retry_attempts must be at least 1",
            ));
        }
        if self.max_schema_prompt_chars == 0 {
            return Err(ReasonerError::configuration(
                "max_schema_prompt_chars must be positive",
            ));
        }
        if self.request_timeout().is_none() {
            return Err(ReasonerError::configuration(
                "request_timeout_seconds must be a positive, representable number of seconds",
            ));
        }
        if self.llm.provider == Provider::Gemini && self.llm.resolved_api_key().is_none() {
            return Err(ReasonerError::configuration(format!(
                "gemini provider needs llm.api_key or {}",
                GEMINI_API_KEY_VAR
            )));
        }
        Ok(())
    }

    pub fn safety_policy(&self) -> SafetyPolicy {
        SafetyPolicy {
            confidence_threshold: self.confidence_threshold,
            allow_destructive: self.allow_destructive,
            destructive_ceiling: self.destructive_confidence_ceiling,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            request_timeout: self
                .request_timeout()
                .unwrap_or(RetryPolicy::default().request_timeout),
            initial_backoff: Duration::from_millis(self.retry_backoff_millis),
            max_backoff: Duration::from_millis(
                self.max_retry_backoff_millis.max(self.retry_backoff_millis),
            ),
        }
    }

    fn request_timeout(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.request_timeout_seconds)
            .ok()
            .filter(|timeout| !timeout.is_zero())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            dialect: self.dialect,
            max_schema_prompt_chars: self.max_schema_prompt_chars,
        }
    }
}

fn default_config_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        config_dir.join("aetherdb/reasoner.toml")
    } else {
        PathBuf::from("reasoner.toml")
    }
}
