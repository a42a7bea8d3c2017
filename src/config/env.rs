//! Environment variable overlay
//!
//! Operators tune a running deployment through environment variables (usually
//! a `.env` file next to the binary). Values found here take precedence over
//! the TOML file. Unparseable values are ignored with a warning so a typo in
//! one key never takes the scheduler down.

use crate::config::types::{Config, TriggerConfig};
use std::str::FromStr;

/// Every environment key the overlay understands
pub const ENV_KEYS: &[&str] = &[
    "EMART_START_PAGE",
    "EMART_END_PAGE",
    "EMART_PAGE_CAP",
    "EMART_PAGE_DELAY_SEC",
    "EMART_EMPTY_PAGE_STOP",
    "EMART_PARTIAL_SAVE_EVERY",
    "EMART_PAGE_SIZE",
    "EMART_BASE_URL",
    "EMB_SERVER",
    "EMB_ENDPOINT",
    "EMB_METHOD",
    "EMB_VERIFY_SSL",
    "EMB_TIMEOUT",
    "ALL_HOUR",
    "ALL_MINUTE",
    "PRICE_HOUR",
    "PRICE_MINUTE",
    "NON_PRICE_HOUR",
    "NON_PRICE_MINUTE",
    "CORS_ALLOW_ORIGINS",
];

/// Strips one layer of matching single or double quotes
pub fn strip_quotes(value: &str) -> &str {
    let v = value.trim();
    if v.len() >= 2
        && ((v.starts_with('"') && v.ends_with('"')) || (v.starts_with('\'') && v.ends_with('\'')))
    {
        &v[1..v.len() - 1]
    } else {
        v
    }
}

/// Applies environment overrides from the process environment
///
/// Loads `.env` from the working directory first, if one exists.
pub fn apply_process_env(config: &mut Config) {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!("Loaded environment file {}", path.display());
    }
    apply_env_overrides(config, |key| std::env::var(key).ok());
}

/// Applies overrides using `lookup` to resolve each key
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| -> Option<String> {
        lookup(key).map(|v| strip_quotes(&v).to_string())
    };

    let crawler = &mut config.crawler;
    if let Some(v) = number::<i64>(&get, "EMART_START_PAGE") {
        if let Some(page) = page_count("EMART_START_PAGE", v.max(1)) {
            crawler.start_page = page;
        }
    }
    if let Some(v) = get("EMART_END_PAGE") {
        if v.is_empty() {
            crawler.end_page = None;
        } else if let Some(n) = parse_or_warn::<i64>("EMART_END_PAGE", &v) {
            if n <= 0 {
                crawler.end_page = None;
            } else if let Some(page) = page_count("EMART_END_PAGE", n) {
                crawler.end_page = Some(page);
            }
        }
    }
    if let Some(v) = number::<i64>(&get, "EMART_PAGE_CAP") {
        if let Some(cap) = page_count("EMART_PAGE_CAP", v.max(1)) {
            crawler.page_cap = Some(cap);
        }
    }
    if let Some(v) = number::<f64>(&get, "EMART_PAGE_DELAY_SEC") {
        crawler.page_delay_secs = v.max(0.0);
    }
    if let Some(v) = number::<u32>(&get, "EMART_EMPTY_PAGE_STOP") {
        crawler.empty_page_stop = v;
    }
    if let Some(v) = number::<u32>(&get, "EMART_PARTIAL_SAVE_EVERY") {
        crawler.partial_save_every = v;
    }
    if let Some(v) = get("EMART_PAGE_SIZE") {
        crawler.page_size = if v.is_empty() {
            None
        } else {
            parse_or_warn::<u32>("EMART_PAGE_SIZE", &v).filter(|n| *n > 0)
        };
    }
    if let Some(v) = get("EMART_BASE_URL").filter(|v| !v.is_empty()) {
        crawler.base_url = v;
    }

    let embedding = &mut config.embedding;
    if let Some(v) = get("EMB_SERVER") {
        embedding.server = if v.is_empty() { None } else { Some(v) };
    }
    if let Some(v) = get("EMB_ENDPOINT").filter(|v| !v.is_empty()) {
        embedding.endpoint = v;
    }
    if let Some(v) = get("EMB_METHOD").filter(|v| !v.is_empty()) {
        embedding.method = v.to_ascii_uppercase();
    }
    if let Some(v) = get("EMB_VERIFY_SSL").filter(|v| !v.is_empty()) {
        embedding.verify_ssl = v.eq_ignore_ascii_case("true");
    }
    if let Some(v) = number::<f64>(&get, "EMB_TIMEOUT") {
        embedding.timeout_secs = v;
    }

    let schedule = &mut config.schedule;
    overlay_trigger(&mut schedule.full, get("ALL_HOUR"), get("ALL_MINUTE"), "ALL");
    overlay_trigger(&mut schedule.price, get("PRICE_HOUR"), get("PRICE_MINUTE"), "PRICE");
    overlay_trigger(
        &mut schedule.non_price,
        get("NON_PRICE_HOUR"),
        get("NON_PRICE_MINUTE"),
        "NON_PRICE",
    );

    if let Some(v) = get("CORS_ALLOW_ORIGINS") {
        config.server.cors_allow_origins = v
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();
    }
}

/// Empty values keep the configured field, matching how blank `.env` entries behave
fn overlay_trigger(
    trigger: &mut Option<TriggerConfig>,
    hour: Option<String>,
    minute: Option<String>,
    prefix: &str,
) {
    let hour = hour.filter(|h| !h.is_empty());
    let minute = minute
        .filter(|m| !m.is_empty())
        .and_then(|m| parse_or_warn::<u32>(&format!("{}_MINUTE", prefix), &m));

    if hour.is_none() && minute.is_none() {
        return;
    }

    let entry = trigger.get_or_insert_with(TriggerConfig::default);
    if let Some(h) = hour {
        entry.hour = h;
    }
    if let Some(m) = minute {
        entry.minute = m;
    }
}

fn number<T: FromStr>(get: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    get(key).and_then(|v| parse_or_warn(key, &v))
}

/// Narrows a positive page value, ignoring it when it exceeds `u32`
fn page_count(key: &str, value: i64) -> Option<u32> {
    match u32::try_from(value) {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring {}={}: out of range", key, value);
            None
        }
    }
}

fn parse_or_warn<T: FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a valid number", key, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overlay(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| env.get(k).cloned());
        config
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("\"https://a.example\""), "https://a.example");
        assert_eq!(strip_quotes("'x'"), "x");
        assert_eq!(strip_quotes("\"unbalanced"), "\"unbalanced");
        assert_eq!(strip_quotes("\""), "\"");
    }

    #[test]
    fn test_oversized_page_values_are_ignored() {
        let config = overlay(&[
            ("EMART_START_PAGE", "4294967297"),
            ("EMART_END_PAGE", "5000000000"),
            ("EMART_PAGE_CAP", "9999999999"),
        ]);
        let defaults = Config::default();
        assert_eq!(config.crawler.start_page, defaults.crawler.start_page);
        assert_eq!(config.crawler.end_page, defaults.crawler.end_page);
        assert_eq!(config.crawler.page_cap, defaults.crawler.page_cap);

        let config = overlay(&[("EMART_END_PAGE", "4294967295")]);
        assert_eq!(config.crawler.end_page, Some(u32::MAX));
    }

    #[test]
    fn test_page_range_overrides() {
        let config = overlay(&[
            ("EMART_START_PAGE", "0"),
            ("EMART_END_PAGE", "12"),
            ("EMART_PAGE_CAP", "40"),
            ("EMART_PAGE_DELAY_SEC", "0.5"),
        ]);
        assert_eq!(config.crawler.start_page, 1);
        assert_eq!(config.crawler.end_page, Some(12));
        assert_eq!(config.crawler.page_cap, Some(40));
        assert_eq!(config.crawler.page_delay_secs, 0.5);
    }

    #[test]
    fn test_non_positive_end_page_means_unbounded() {
        assert_eq!(overlay(&[("EMART_END_PAGE", "0")]).crawler.end_page, None);
        assert_eq!(overlay(&[("EMART_END_PAGE", "")]).crawler.end_page, None);
    }

    #[test]
    fn test_invalid_number_keeps_default() {
        let config = overlay(&[("EMART_EMPTY_PAGE_STOP", "two")]);
        assert_eq!(config.crawler.empty_page_stop, 2);
    }

    #[test]
    fn test_quoted_embedding_server() {
        let config = overlay(&[
            ("EMB_SERVER", "\"http://localhost:8000\""),
            ("EMB_METHOD", "post"),
        ]);
        assert_eq!(config.embedding.server.as_deref(), Some("http://localhost:8000"));
        assert_eq!(config.embedding.method, "POST");
    }

    #[test]
    fn test_schedule_overrides() {
        let config = overlay(&[("ALL_HOUR", "5"), ("PRICE_MINUTE", "15"), ("NON_PRICE_HOUR", "")]);
        assert_eq!(config.schedule.full, Some(TriggerConfig::new("5", 30)));
        assert_eq!(config.schedule.price, Some(TriggerConfig::new("1-2,5-23", 15)));
        assert_eq!(config.schedule.non_price, Some(TriggerConfig::new("4", 30)));
    }

    #[test]
    fn test_cors_list() {
        let config = overlay(&[("CORS_ALLOW_ORIGINS", "http://a.test, ,http://b.test")]);
        assert_eq!(
            config.server.cors_allow_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }
}
