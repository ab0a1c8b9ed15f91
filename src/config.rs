//! Env-driven configuration for the proxy and the CLI.
//!
//! Values are read from the process environment; `dotenv` is loaded on demand
//! by the binaries. Everything except the API key has a default suitable for
//! running next to a local chat frontend.
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

pub const DEFAULT_API_URL: &str = "https://api-inference.modelscope.cn/v1/images/generations";
pub const DEFAULT_MODEL_ID: &str = "MusePublic/489_ckpt_FLUX_1";
pub const DEFAULT_LISTEN_PORT: u16 = 18188;

/// How generated images are named on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Every job overwrites the same well-known file.
    Shared,
    /// Each job gets its own file; the well-known file mirrors the newest one.
    PerJob,
}

impl FromStr for OutputMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared" => Ok(OutputMode::Shared),
            "per-job" | "per_job" | "perjob" => Ok(OutputMode::PerJob),
            other => Err(AppError::Config(format!(
                "OUTPUT_MODE must be 'shared' or 'per-job', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub api_key: String,
    pub model_id: String,
    pub listen_host: String,
    pub listen_port: u16,
    pub output_dir: PathBuf,
    pub output_mode: OutputMode,
    pub request_timeout: Duration,
    pub max_concurrent_generations: usize,
    pub job_capacity: usize,
    pub job_ttl: Duration,
    pub public_base_url: String,
}

impl Config {
    pub fn dotenv_load() {
        dotenv::dotenv().ok();
    }

    pub fn new() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. `new` uses the process
    /// environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_host = get("LISTEN_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let listen_port = parse_or(&get, "LISTEN_PORT", DEFAULT_LISTEN_PORT)?;
        let output_mode = match get("OUTPUT_MODE") {
            Some(v) => v.parse()?,
            None => OutputMode::Shared,
        };
        let max_concurrent_generations: usize = parse_or(&get, "MAX_CONCURRENT_GENERATIONS", 1)?;
        if max_concurrent_generations == 0 {
            return Err(AppError::Config("MAX_CONCURRENT_GENERATIONS must be at least 1".to_string()));
        }
        let job_capacity: usize = parse_or(&get, "JOB_CAPACITY", 1024)?;
        if job_capacity == 0 {
            return Err(AppError::Config("JOB_CAPACITY must be at least 1".to_string()));
        }
        let public_base_url = get("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://{}:{}", listen_host, listen_port))
            .trim_end_matches('/')
            .to_string();

        Ok(Config {
            api_url: get("CLOUD_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_key: get("CLOUD_API_KEY").unwrap_or_default(),
            model_id: get("CLOUD_MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            listen_host,
            listen_port,
            output_dir: PathBuf::from(get("OUTPUT_DIR").unwrap_or_else(|| "./public".to_string())),
            output_mode,
            request_timeout: Duration::from_secs(parse_or(&get, "REQUEST_TIMEOUT_SECS", 120)?),
            max_concurrent_generations,
            job_capacity,
            job_ttl: Duration::from_secs(parse_or(&get, "JOB_TTL_SECS", 86_400)?),
            public_base_url,
        })
    }

    /// Number of generations allowed to run at once. Shared output mode
    /// always serializes so the well-known file is written by one job at a time.
    pub fn generation_permits(&self) -> usize {
        match self.output_mode {
            OutputMode::Shared => 1,
            OutputMode::PerJob => self.max_concurrent_generations,
        }
    }

    pub fn print_env_vars(&self) {
        tracing::info!("CLOUD_API_URL: {}", self.api_url);
        tracing::info!("CLOUD_API_KEY: {}", mask_key(&self.api_key));
        tracing::info!("CLOUD_MODEL_ID: {}", self.model_id);
        tracing::info!("LISTEN: {}:{}", self.listen_host, self.listen_port);
        tracing::info!("OUTPUT_DIR: {} ({:?})", self.output_dir.display(), self.output_mode);
        tracing::info!("REQUEST_TIMEOUT_SECS: {}", self.request_timeout.as_secs());
        tracing::info!("PUBLIC_BASE_URL: {}", self.public_base_url);
        if self.api_key.is_empty() {
            tracing::warn!("CLOUD_API_KEY is not set; cloud requests will most likely be rejected");
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid {} '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

fn mask_key(key: &str) -> String {
    if key.is_empty() {
        return "<unset>".to_string();
    }
    let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppResult<Config> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
        assert_eq!(cfg.model_id, DEFAULT_MODEL_ID);
        assert_eq!(cfg.listen_host, "127.0.0.1");
        assert_eq!(cfg.listen_port, 18188);
        assert_eq!(cfg.output_mode, OutputMode::Shared);
        assert_eq!(cfg.request_timeout, Duration::from_secs(120));
        assert_eq!(cfg.public_base_url, "http://127.0.0.1:18188");
        assert!(cfg.api_key.is_empty());
    }

    #[test]
    fn values_are_read_from_lookup() {
        let cfg = config_from(&[
            ("CLOUD_API_URL", "http://cloud.test/gen"),
            ("CLOUD_API_KEY", "Bearer abc"),
            ("LISTEN_PORT", "9000"),
            ("OUTPUT_MODE", "per-job"),
            ("MAX_CONCURRENT_GENERATIONS", "3"),
            ("PUBLIC_BASE_URL", "https://chat.example/"),
        ])
        .unwrap();
        assert_eq!(cfg.api_url, "http://cloud.test/gen");
        assert_eq!(cfg.api_key, "Bearer abc");
        assert_eq!(cfg.listen_port, 9000);
        assert_eq!(cfg.output_mode, OutputMode::PerJob);
        assert_eq!(cfg.generation_permits(), 3);
        assert_eq!(cfg.public_base_url, "https://chat.example");
    }

    #[test]
    fn shared_mode_serializes_generations() {
        let cfg = config_from(&[("MAX_CONCURRENT_GENERATIONS", "8")]).unwrap();
        assert_eq!(cfg.generation_permits(), 1);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = config_from(&[("LISTEN_PORT", "not-a-port")]).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(config_from(&[("JOB_CAPACITY", "0")]).is_err());
        assert!(config_from(&[("OUTPUT_MODE", "sometimes")]).is_err());
    }

    #[test]
    fn key_is_masked() {
        assert_eq!(mask_key(""), "<unset>");
        assert_eq!(mask_key("ms-1234567890"), "****7890");
    }
}
