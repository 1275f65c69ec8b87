//! Service configuration: defaults overridable through `TM_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::error::ConfigError;

/// How the TM matcher picks among several qualifying entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// quality_score desc, usage_count desc, last_used desc, id asc.
    Ranked,
    /// Lowest row id wins, scores ignored. Parity mode for unscored migrations.
    FirstMatch,
}

impl FromStr for MatchPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ranked" => Ok(MatchPolicy::Ranked),
            "first_match" | "first-match" => Ok(MatchPolicy::FirstMatch),
            other => Err(ConfigError::InvalidValue {
                key: "TM_MATCH_POLICY",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::InvalidValue {
                key: "TM_LOG_FORMAT",
                value: other.to_string(),
            }),
        }
    }
}

/// Matching knobs consumed by the hint composer.
#[derive(Debug, Clone, Serialize)]
pub struct MatchConfig {
    /// Overall deadline for one hint composition.
    #[serde(skip)]
    pub request_timeout: Duration,
    /// Shortest token looked up in the glossary.
    pub glossary_min_token_len: usize,
    /// Shortest token used for TM substring search.
    pub tm_min_token_len: usize,
    pub policy: MatchPolicy,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(2000),
            glossary_min_token_len: 2,
            tm_min_token_len: 3,
            policy: MatchPolicy::Ranked,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub pool_size: usize,
    pub log_format: LogFormat,
    pub matching: MatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            db_path: PathBuf::from("tm_leverage.db"),
            pool_size: 8,
            log_format: LogFormat::Pretty,
            matching: MatchConfig::default(),
        }
    }
}

impl Config {
    /// Build config from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Unparsable values are logged
    /// and replaced by the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();

        if let Some(v) = parsed(&lookup, "TM_BIND_ADDR") {
            cfg.bind_addr = v;
        }
        if let Some(v) = lookup("TM_DB_PATH").filter(|s| !s.trim().is_empty()) {
            cfg.db_path = PathBuf::from(v);
        }
        if let Some(v) = parsed::<usize, _>(&lookup, "TM_POOL_SIZE") {
            cfg.pool_size = v.max(1);
        }
        if let Some(v) = parsed(&lookup, "TM_LOG_FORMAT") {
            cfg.log_format = v;
        }
        if let Some(ms) = parsed::<u64, _>(&lookup, "TM_REQUEST_TIMEOUT_MS") {
            cfg.matching.request_timeout = Duration::from_millis(ms.max(1));
        }
        if let Some(v) = parsed::<usize, _>(&lookup, "TM_GLOSSARY_MIN_TOKEN_LEN") {
            cfg.matching.glossary_min_token_len = v.max(1);
        }
        if let Some(v) = parsed::<usize, _>(&lookup, "TM_TM_MIN_TOKEN_LEN") {
            cfg.matching.tm_min_token_len = v.max(1);
        }
        if let Some(v) = parsed(&lookup, "TM_MATCH_POLICY") {
            cfg.matching.policy = v;
        }

        cfg
    }
}

fn parsed<T, F>(lookup: &F, key: &'static str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "ignoring unparsable config value");
            None
        }
    }
}
