use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::http_cache::fetch_json_cached;
use crate::http_client::http_client;

pub const AUTH_HEADER: &str = "X-TBA-Auth-Key";

/// Raw answer from the API: whatever status came back, with its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
    pub url: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The two read-only endpoints the pipeline needs.
///
/// `Err` means no response was obtained at all; HTTP error statuses come back
/// as `Ok` with the status preserved so callers can record them.
pub trait MatchApi {
    fn events(&self, year: u16) -> Result<ApiResponse>;
    fn event_matches(&self, event_key: &str) -> Result<ApiResponse>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub event_code: Option<String>,
    #[serde(default)]
    pub event_type_string: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl EventSummary {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("No Name")
    }
}

/// Blue Alliance API v3 client.
pub struct TbaClient {
    base_url: String,
    api_key: String,
    timeout_secs: u64,
    use_cache: bool,
}

impl TbaClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            timeout_secs: settings.http_timeout_secs,
            use_cache: settings.http_cache,
        }
    }

    fn get(&self, path: &str) -> Result<ApiResponse> {
        let client = http_client(self.timeout_secs)?;
        let url = format!("{}{path}", self.base_url);
        fetch_json_cached(
            client,
            &url,
            &[(AUTH_HEADER, self.api_key.as_str())],
            self.use_cache,
        )
        .with_context(|| format!("GET {url}"))
    }
}

impl MatchApi for TbaClient {
    fn events(&self, year: u16) -> Result<ApiResponse> {
        self.get(&format!("/events/{year}"))
    }

    fn event_matches(&self, event_key: &str) -> Result<ApiResponse> {
        self.get(&format!("/event/{event_key}/matches"))
    }
}

/// Fetch and parse the event listing for a season.
pub fn fetch_events<A: MatchApi + ?Sized>(api: &A, year: u16) -> Result<Vec<EventSummary>> {
    let resp = api.events(year)?;
    if !resp.is_success() {
        return Err(anyhow!("error fetching events: {}", resp.status));
    }
    parse_events_json(&resp.body)
}

pub fn parse_events_json(raw: &str) -> Result<Vec<EventSummary>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).context("invalid events json")
}
