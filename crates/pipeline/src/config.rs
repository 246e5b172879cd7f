use enrich::RetryPolicy;
use graphstore::GraphConfig;
use prompting::{InferenceClient, InferenceError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub graph: GraphConfig,
    pub inference: InferenceConfig,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferenceConfig {
    pub base_url: String,
    pub model: String,
    /// No timeout unless set
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConcurrencyConfig {
    pub max_workers: usize,
    pub lookup_workers: usize,
    pub trial_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    /// Daily rolling log files are written here when set
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            graph: GraphConfig::default(),
            inference: InferenceConfig {
                base_url: "http://localhost:11434".to_string(),
                model: "llama3:8b".to_string(),
                timeout_secs: None,
            },
            concurrency: ConcurrencyConfig {
                max_workers: 5,
                lookup_workers: 10,
                trial_workers: 5,
            },
            retry: RetryConfig {
                max_attempts: 4,
                initial_backoff_ms: 1000,
                max_backoff_ms: 16000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
                log_dir: None,
            },
        }
    }
}

impl AppConfig {
    pub fn fast_mode() -> Self {
        let mut config = Self::default();
        config.concurrency = ConcurrencyConfig {
            max_workers: 16,
            lookup_workers: 20,
            trial_workers: 10,
        };
        config.retry = RetryConfig {
            max_attempts: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 4000,
        };
        config
    }

    /// One request in flight and a longer retry budget, for a loaded model
    /// server
    pub fn careful_mode() -> Self {
        let mut config = Self::default();
        config.inference.timeout_secs = Some(300);
        config.concurrency = ConcurrencyConfig {
            max_workers: 1,
            lookup_workers: 4,
            trial_workers: 2,
        };
        config.retry = RetryConfig {
            max_attempts: 6,
            initial_backoff_ms: 2000,
            max_backoff_ms: 32000,
        };
        config
    }

    /// Load `.env` if present, then apply the process environment on top of
    /// `base`
    pub fn from_env(base: Self) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(base, |key| std::env::var(key).ok())
    }

    /// Apply any key lookup on top of `base`. Graph credentials are
    /// required; everything else keeps the base value.
    pub fn from_lookup<F>(base: Self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = base;

        config.graph = GraphConfig {
            uri: first_set(&lookup, &["uri", "NEO4J_URI"]).ok_or(ConfigError::Missing("uri"))?,
            username: first_set(&lookup, &["username", "NEO4J_USER"])
                .ok_or(ConfigError::Missing("username"))?,
            password: first_set(&lookup, &["password", "NEO4J_PASSWORD"])
                .ok_or(ConfigError::Missing("password"))?,
        };

        if let Some(url) = first_set(&lookup, &["OLLAMA_URL"]) {
            config.inference.base_url = url;
        }
        if let Some(model) = first_set(&lookup, &["OLLAMA_MODEL"]) {
            config.inference.model = model;
        }
        if let Some(secs) = first_set(&lookup, &["INFERENCE_TIMEOUT_SECS"]) {
            config.inference.timeout_secs = Some(parse("INFERENCE_TIMEOUT_SECS", &secs)?);
        }
        if let Some(workers) = first_set(&lookup, &["MAX_WORKERS"]) {
            config.concurrency.max_workers = parse("MAX_WORKERS", &workers)?;
        }
        if let Some(retries) = first_set(&lookup, &["MAX_RETRIES"]) {
            config.retry.max_attempts = parse("MAX_RETRIES", &retries)?;
        }
        if let Some(level) = first_set(&lookup, &["LOG_LEVEL"]) {
            config.logging.level = level;
        }
        if let Some(format) = first_set(&lookup, &["LOG_FORMAT"]) {
            config.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "LOG_FORMAT",
                        value: format,
                    });
                }
            };
        }
        if let Some(dir) = first_set(&lookup, &["LOG_DIR"]) {
            config.logging.log_dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    pub fn inference_client(&self) -> Result<InferenceClient, InferenceError> {
        InferenceClient::new(
            self.inference.base_url.clone(),
            self.inference.model.clone(),
            self.inference.timeout_secs.map(Duration::from_secs),
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            self.retry.initial_backoff_ms,
            self.retry.max_backoff_ms,
        )
    }
}

fn first_set<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .find_map(|key| lookup(*key).filter(|v| !v.is_empty()))
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}
