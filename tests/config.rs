use std::collections::HashMap;
use std::path::PathBuf;

use frc_match_sync::config::{ConfigError, DEFAULT_BASE_URL, DEFAULT_YEAR, Settings};
use frc_match_sync::dataset::UpsertGuard;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<HashMap<_, _>>();
    move |key| map.get(key).cloned()
}

#[test]
fn missing_api_key_is_fatal() {
    assert_eq!(
        Settings::from_lookup(lookup(&[])),
        Err(ConfigError::MissingApiKey)
    );
    assert_eq!(
        Settings::from_lookup(lookup(&[("TBA_API_KEY", "   ")])),
        Err(ConfigError::MissingApiKey)
    );
}

#[test]
fn defaults_apply() {
    let settings = Settings::from_lookup(lookup(&[("TBA_API_KEY", "secret")])).expect("settings");
    assert_eq!(settings.api_key, "secret");
    assert_eq!(settings.base_url, DEFAULT_BASE_URL);
    assert_eq!(settings.year, DEFAULT_YEAR);
    assert_eq!(settings.output, PathBuf::from("matches.xlsx"));
    assert_eq!(settings.upsert_guard, UpsertGuard::Off);
    assert_eq!(settings.http_timeout_secs, 10);
    assert!(settings.http_cache);
}

#[test]
fn overrides_apply() {
    let settings = Settings::from_lookup(lookup(&[
        ("TBA_API_KEY", "secret"),
        ("TBA_YEAR", "2024"),
        ("MATCHES_OUTPUT", "data/out.xlsx"),
        ("UPSERT_GUARD", "keep-previous"),
        ("HTTP_TIMEOUT_SECS", "0"),
        ("HTTP_CACHE", "off"),
    ]))
    .expect("settings");
    assert_eq!(settings.year, 2024);
    assert_eq!(settings.output, PathBuf::from("data/out.xlsx"));
    assert_eq!(settings.upsert_guard, UpsertGuard::KeepPrevious);
    assert_eq!(settings.http_timeout_secs, 1);
    assert!(!settings.http_cache);
}

#[test]
fn invalid_values_are_reported() {
    assert_eq!(
        Settings::from_lookup(lookup(&[("TBA_API_KEY", "k"), ("TBA_YEAR", "next")])),
        Err(ConfigError::Invalid {
            key: "TBA_YEAR",
            value: "next".to_string()
        })
    );
    assert!(matches!(
        Settings::from_lookup(lookup(&[("TBA_API_KEY", "k"), ("UPSERT_GUARD", "maybe")])),
        Err(ConfigError::Invalid { key: "UPSERT_GUARD", .. })
    ));
}
