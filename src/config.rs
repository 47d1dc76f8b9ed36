// src/config.rs
use crate::error::ApiError;
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

pub const API_URL_VAR: &str = "PORTFOLIO_API_URL";
pub const TOKEN_PATH_VAR: &str = "PORTFOLIO_TOKEN_PATH";
pub const TIMEOUT_VAR: &str = "PORTFOLIO_TIMEOUT_SECS";
pub const LOG_VAR: &str = "PORTFOLIO_LOG";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const TOKEN_DIR: &str = ".portfolio_tracker";
const TOKEN_FILE: &str = "token";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Backend base URL, without a trailing slash.
    pub api_url: String,
    pub token_path: PathBuf,
    pub timeout: Duration,
    pub log_level: LevelFilter,
}

impl Config {
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_url = get(API_URL_VAR)
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .ok_or_else(|| ApiError::Config(format!("{} is not set", API_URL_VAR)))?;

        let token_path = match get(TOKEN_PATH_VAR) {
            Some(path) => PathBuf::from(path),
            None => match get("HOME") {
                Some(home) => PathBuf::from(home).join(TOKEN_DIR).join(TOKEN_FILE),
                None => PathBuf::from(".portfolio_token"),
            },
        };

        let timeout = match get(TIMEOUT_VAR) {
            Some(raw) => raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| {
                ApiError::Config(format!("{} must be whole seconds, got {:?}", TIMEOUT_VAR, raw))
            })?,
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let log_level = match get(LOG_VAR) {
            Some(raw) => raw
                .trim()
                .parse::<LevelFilter>()
                .map_err(|_| ApiError::Config(format!("unknown log level {:?}", raw)))?,
            None => LevelFilter::Info,
        };

        Ok(Self {
            api_url,
            token_path,
            timeout,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn api_url_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
        let err = Config::from_lookup(lookup(&[(API_URL_VAR, "  ")])).unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[
            (API_URL_VAR, "http://localhost:8000/"),
            ("HOME", "/home/trader"),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "http://localhost:8000");
        assert_eq!(
            config.token_path,
            PathBuf::from("/home/trader/.portfolio_tracker/token")
        );
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.log_level, LevelFilter::Info);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            (API_URL_VAR, "https://api.example.com"),
            (TOKEN_PATH_VAR, "/tmp/tok"),
            (TIMEOUT_VAR, "5"),
            (LOG_VAR, "debug"),
        ]))
        .unwrap();
        assert_eq!(config.token_path, PathBuf::from("/tmp/tok"));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.log_level, LevelFilter::Debug);
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let err =
            Config::from_lookup(lookup(&[(API_URL_VAR, "http://x"), (TIMEOUT_VAR, "soon")]))
                .unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }
}
