use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tba::ApiResponse;

const CACHE_VERSION: u32 = 1;
const CACHE_DIR: &str = "frc_match_sync";
const CACHE_FILE: &str = "http_cache.json";
const MAX_ENTRIES: usize = 512;

static CACHE: Mutex<Option<HttpCacheFile>> = Mutex::new(None);

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct HttpCacheFile {
    version: u32,
    entries: HashMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    body: String,
    etag: Option<String>,
    last_modified: Option<String>,
    fetched_at: u64,
}

/// GET `url`, revalidating against the on-disk cache when `use_cache` is set.
///
/// Non-success statuses are returned as responses, not errors; only transport
/// failures (connect, timeout, unreadable body) become `Err`. A `304 Not
/// Modified` is answered from the cache as a `200`.
pub fn fetch_json_cached(
    client: &Client,
    url: &str,
    extra_headers: &[(&str, &str)],
    use_cache: bool,
) -> Result<ApiResponse> {
    let cached_entry = if use_cache {
        with_cache(|cache| cache.entries.get(url).cloned())
    } else {
        None
    };

    let mut req = client.get(url).header("accept", "application/json");
    for (name, value) in extra_headers {
        req = req.header(*name, *value);
    }
    if let Some(entry) = cached_entry.as_ref() {
        if let Some(etag) = entry.etag.as_ref() {
            req = req.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = entry.last_modified.as_ref() {
            req = req.header(IF_MODIFIED_SINCE, last_modified);
        }
    }

    let resp = req.send().context("request failed")?;
    let status = resp.status();
    let headers = resp.headers().clone();
    if status == StatusCode::NOT_MODIFIED
        && let Some(entry) = cached_entry
    {
        debug!(url, "not modified, serving cached body");
        return Ok(ApiResponse {
            status: StatusCode::OK.as_u16(),
            body: entry.body,
            url: url.to_string(),
        });
    }

    let body = resp.text().context("failed reading body")?;
    if use_cache && status.is_success() {
        let etag = headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let last_modified = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        if etag.is_some() || last_modified.is_some() {
            store_entry(
                url,
                CacheEntry {
                    body: body.clone(),
                    etag,
                    last_modified,
                    fetched_at: system_time_to_secs(SystemTime::now()).unwrap_or_default(),
                },
            );
        }
    }

    Ok(ApiResponse {
        status: status.as_u16(),
        body,
        url: url.to_string(),
    })
}

impl HttpCacheFile {
    /// Insert an entry, evicting the least recently fetched ones past `MAX_ENTRIES`.
    fn insert(&mut self, key: &str, entry: CacheEntry) {
        self.entries.insert(key.to_string(), entry);
        while self.entries.len() > MAX_ENTRIES {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.fetched_at)
                .map(|(url, _)| url.clone())
            else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }
}

fn with_cache<T>(f: impl FnOnce(&mut HttpCacheFile) -> T) -> T {
    let mut guard = CACHE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let cache = guard.get_or_insert_with(load_cache_file);
    f(cache)
}

fn store_entry(key: &str, entry: CacheEntry) {
    with_cache(|cache| {
        cache.version = CACHE_VERSION;
        cache.insert(key, entry);
        if let Err(err) = save_cache_file(cache) {
            debug!(error = %err, "http cache not persisted");
        }
    });
}

fn load_cache_file() -> HttpCacheFile {
    let Some(path) = cache_path() else {
        return HttpCacheFile::default();
    };
    let Ok(raw) = fs::read_to_string(path) else {
        return HttpCacheFile::default();
    };
    let cache = serde_json::from_str::<HttpCacheFile>(&raw).unwrap_or_default();
    if cache.version != CACHE_VERSION {
        return HttpCacheFile::default();
    }
    cache
}

fn save_cache_file(cache: &HttpCacheFile) -> Result<()> {
    let Some(path) = cache_path() else {
        return Ok(());
    };
    let Some(dir) = path.parent() else {
        return Ok(());
    };
    fs::create_dir_all(dir).ok();
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(cache).context("serialize http cache")?;
    fs::write(&tmp, json).context("write http cache")?;
    fs::rename(&tmp, &path).context("swap http cache")?;
    Ok(())
}

fn cache_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(CACHE_FILE))
}

/// Per-user cache directory: `$XDG_CACHE_HOME/frc_match_sync`, else `~/.cache/frc_match_sync`.
pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

fn system_time_to_secs(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(fetched_at: u64) -> CacheEntry {
        CacheEntry {
            body: "[]".to_string(),
            etag: Some(format!("\"{fetched_at}\"")),
            last_modified: None,
            fetched_at,
        }
    }

    #[test]
    fn cache_evicts_least_recently_fetched() {
        let mut cache = HttpCacheFile::default();
        for idx in 0..MAX_ENTRIES {
            cache.insert(&format!("https://example.test/{idx}"), entry(1_000 + idx as u64));
        }
        cache.insert("https://example.test/0", entry(9_000));
        assert_eq!(cache.entries.len(), MAX_ENTRIES);

        cache.insert("https://example.test/new", entry(9_001));
        assert_eq!(cache.entries.len(), MAX_ENTRIES);
        assert!(cache.entries.contains_key("https://example.test/0"));
        assert!(cache.entries.contains_key("https://example.test/new"));
        assert!(!cache.entries.contains_key("https://example.test/1"));
    }
}
