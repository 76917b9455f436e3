use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::dataset::UpsertGuard;
use crate::http_client::DEFAULT_TIMEOUT_SECS;

pub const DEFAULT_BASE_URL: &str = "https://www.thebluealliance.com/api/v3";
pub const DEFAULT_YEAR: u16 = 2025;
pub const DEFAULT_OUTPUT: &str = "matches.xlsx";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("TBA_API_KEY is not set; add it to the environment or a .env file")]
    MissingApiKey,
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_key: String,
    pub base_url: String,
    pub year: u16,
    pub output: PathBuf,
    pub upsert_guard: UpsertGuard,
    pub http_timeout_secs: u64,
    pub http_cache: bool,
}

impl Settings {
    /// Load `.env.local` and `.env` (if present), then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get("TBA_API_KEY").ok_or(ConfigError::MissingApiKey)?;

        let year = match get("TBA_YEAR") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                key: "TBA_YEAR",
                value: raw,
            })?,
            None => DEFAULT_YEAR,
        };

        let upsert_guard = match get("UPSERT_GUARD") {
            Some(raw) => parse_guard(&raw).ok_or(ConfigError::Invalid {
                key: "UPSERT_GUARD",
                value: raw,
            })?,
            None => UpsertGuard::Off,
        };

        let http_timeout_secs = get("HTTP_TIMEOUT_SECS")
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .max(1);

        let http_cache = !matches!(
            get("HTTP_CACHE").map(|v| v.to_ascii_lowercase()).as_deref(),
            Some("off" | "0" | "false" | "no")
        );

        Ok(Self {
            api_key,
            base_url: get("TBA_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            year,
            output: get("MATCHES_OUTPUT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
            upsert_guard,
            http_timeout_secs,
            http_cache,
        })
    }
}

fn parse_guard(raw: &str) -> Option<UpsertGuard> {
    match raw.to_ascii_lowercase().as_str() {
        "off" | "none" => Some(UpsertGuard::Off),
        "keep-previous" | "keep_previous" => Some(UpsertGuard::KeepPrevious),
        _ => None,
    }
}
