//! Runtime configuration from environment variables (and `.env`).

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::convert::PipelineOptions;
use crate::engine::UnresolvedTokens;

const DEFAULT_TEMPLATE_DIR: &str = "./templates";
const DEFAULT_CACHE_CAPACITY: u64 = 32;
const DEFAULT_SOFFICE_BIN: &str = "soffice";
const DEFAULT_CONCURRENCY: usize = 2;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("{0} must be set when {1}")]
    Missing(&'static str, &'static str),
}

/// Which converter the pipeline talks to.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendConfig {
    Soffice { binary: PathBuf },
    Gotenberg { url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub template_dir: PathBuf,
    /// Zero disables the template cache.
    pub template_cache_capacity: u64,
    pub backend: BackendConfig,
    pub converter_concurrency: usize,
    pub converter_timeout: Duration,
    pub converter_queue_timeout: Option<Duration>,
    pub unresolved_tokens: UnresolvedTokens,
    pub bind_addr: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from(DEFAULT_TEMPLATE_DIR),
            template_cache_capacity: DEFAULT_CACHE_CAPACITY,
            backend: BackendConfig::Soffice {
                binary: PathBuf::from(DEFAULT_SOFFICE_BIN),
            },
            converter_concurrency: DEFAULT_CONCURRENCY,
            converter_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            converter_queue_timeout: None,
            unresolved_tokens: UnresolvedTokens::Keep,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl EngineConfig {
    /// Read the process environment after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; unset and blank variables take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let backend = match get("CONVERTER_BACKEND")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("soffice") => BackendConfig::Soffice {
                binary: get("SOFFICE_BIN")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SOFFICE_BIN)),
            },
            Some("gotenberg") => BackendConfig::Gotenberg {
                url: get("GOTENBERG_URL").ok_or(ConfigError::Missing(
                    "GOTENBERG_URL",
                    "CONVERTER_BACKEND=gotenberg",
                ))?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "CONVERTER_BACKEND",
                    value: other.to_string(),
                    reason: "expected soffice or gotenberg",
                })
            }
        };

        let converter_concurrency = match get("CONVERTER_CONCURRENCY") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "CONVERTER_CONCURRENCY",
                        value: raw,
                        reason: "expected a whole number of at least 1",
                    })
                }
            },
            None => defaults.converter_concurrency,
        };

        let unresolved_tokens = match get("UNRESOLVED_TOKENS") {
            Some(raw) => UnresolvedTokens::from_name(&raw).ok_or(ConfigError::Invalid {
                name: "UNRESOLVED_TOKENS",
                value: raw.clone(),
                reason: "expected keep, blank or reject",
            })?,
            None => defaults.unresolved_tokens,
        };

        Ok(Self {
            template_dir: get("TEMPLATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.template_dir),
            template_cache_capacity: parse_number(get("TEMPLATE_CACHE_CAPACITY"), "TEMPLATE_CACHE_CAPACITY")?
                .unwrap_or(defaults.template_cache_capacity),
            backend,
            converter_concurrency,
            converter_timeout: parse_number(get("CONVERTER_TIMEOUT_SECS"), "CONVERTER_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.converter_timeout),
            converter_queue_timeout: parse_number(
                get("CONVERTER_QUEUE_TIMEOUT_SECS"),
                "CONVERTER_QUEUE_TIMEOUT_SECS",
            )?
            .map(Duration::from_secs),
            unresolved_tokens,
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
        })
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            concurrency: self.converter_concurrency,
            run_timeout: self.converter_timeout,
            queue_timeout: self.converter_queue_timeout,
            temp_root: None,
        }
    }
}

fn parse_number(raw: Option<String>, name: &'static str) -> Result<Option<u64>, ConfigError> {
    raw.map(|value| {
        value.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
            name,
            value,
            reason: "expected a whole number",
        })
    })
    .transpose()
}
