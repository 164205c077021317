//! Crawler-wide settings, resolved file → env var → hardcoded default.
//!
//! Follows the teacher's `core::config::ShadowConfig` pattern: a
//! `serde`-deserializable struct with every field optional, paired with
//! `resolve_*()` methods that fall through JSON field → environment
//! variable → compiled-in default. A spider can run with no settings file
//! present at all.

use std::collections::HashMap;
use std::time::Duration;

/// Enumerated settings keys from the external-interfaces contract.
#[derive(serde::Deserialize, Default, Clone, Debug)]
#[serde(default)]
pub struct Settings {
    pub bot: Option<String>,
    pub user_agent: Option<String>,
    pub default_headers: Option<HashMap<String, String>>,
    pub robotstxt_obey: Option<bool>,
    pub cookies_debug: Option<bool>,
    pub cookies_store_enabled: Option<bool>,
    pub cookies_store_db: Option<String>,
    pub cookies_clear: Option<bool>,
    pub download_timeout: Option<u64>,
    pub download_delay: Option<f64>,
    pub download_delay_domain: Option<HashMap<String, f64>>,
    pub concurrent_requests: Option<usize>,
    pub depth_priority: Option<u8>,
    pub redirect_enabled: Option<bool>,
    pub retry_times: Option<u32>,
    pub retry_http_codes: Option<Vec<u16>>,
    pub downloader_middlewares: Option<Vec<String>>,
    pub item_pipelines: Option<Vec<String>>,
    pub log_enabled: Option<bool>,
    pub log_encoding: Option<String>,
    pub log_file: Option<String>,
    pub log_format: Option<String>,
}

const DEFAULT_RETRY_CODES: &[u16] = &[408, 429, 500, 502, 503, 504, 522, 524];

impl Settings {
    /// `BOT` / `USER_AGENT`: JSON field → `CRAWLER_USER_AGENT` env var → default.
    pub fn resolve_user_agent(&self) -> String {
        if let Some(ua) = &self.user_agent {
            if !ua.trim().is_empty() {
                return ua.clone();
            }
        }
        std::env::var("CRAWLER_USER_AGENT")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| format!("{}/0.1", self.bot.clone().unwrap_or_else(|| "rcrawl".into())))
    }

    pub fn resolve_robotstxt_obey(&self) -> bool {
        self.robotstxt_obey.unwrap_or(true)
    }

    pub fn resolve_cookies_debug(&self) -> bool {
        self.cookies_debug.unwrap_or(false)
    }

    pub fn resolve_cookies_store_enabled(&self) -> bool {
        self.cookies_store_enabled.unwrap_or(true)
    }

    /// `COOKIES_STORE_DB`: JSON field → `COOKIES_STORE_DB` env var → `:memory:`.
    pub fn resolve_cookies_store_db(&self) -> String {
        if let Some(db) = &self.cookies_store_db {
            if !db.trim().is_empty() {
                return db.clone();
            }
        }
        std::env::var("COOKIES_STORE_DB").unwrap_or_else(|_| ":memory:".to_string())
    }

    pub fn resolve_cookies_clear(&self) -> bool {
        self.cookies_clear.unwrap_or(false)
    }

    pub fn resolve_download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout.unwrap_or(30))
    }

    pub fn resolve_download_delay(&self) -> Duration {
        Duration::from_secs_f64(self.download_delay.unwrap_or(0.0))
    }

    /// Delay configured for `host`: `DOWNLOAD_DELAY_DOMAIN[host]` else the global delay.
    pub fn resolve_delay_for_host(&self, host: &str) -> Duration {
        if let Some(map) = &self.download_delay_domain {
            if let Some(secs) = map.get(host) {
                return Duration::from_secs_f64(*secs);
            }
        }
        self.resolve_download_delay()
    }

    pub fn resolve_concurrent_requests(&self) -> usize {
        self.concurrent_requests.unwrap_or(16)
    }

    /// Size of the free handle pool: `max(16, 2 * CONCURRENT_REQUESTS)`.
    pub fn resolve_pool_capacity(&self) -> usize {
        (2 * self.resolve_concurrent_requests()).max(16)
    }

    /// `0` = BFO, nonzero = DFO (derived requests pushed to the front).
    pub fn resolve_depth_priority(&self) -> u8 {
        self.depth_priority.unwrap_or(0)
    }

    pub fn resolve_redirect_enabled(&self) -> bool {
        self.redirect_enabled.unwrap_or(true)
    }

    pub fn resolve_retry_times(&self) -> u32 {
        self.retry_times.unwrap_or(2)
    }

    pub fn resolve_retry_http_codes(&self) -> Vec<u16> {
        self.retry_http_codes
            .clone()
            .unwrap_or_else(|| DEFAULT_RETRY_CODES.to_vec())
    }

    pub fn resolve_downloader_middlewares(&self) -> Vec<String> {
        self.downloader_middlewares.clone().unwrap_or_default()
    }

    pub fn resolve_item_pipelines(&self) -> Vec<String> {
        self.item_pipelines.clone().unwrap_or_default()
    }
}

/// Load settings from a JSON file.
///
/// Search order (first found wins): `./crawler.json`, `CRAWLER_SETTINGS`
/// env var path. Missing file or parse error → `Settings::default()`
/// (logged), so every field falls through to its env-var/hardcoded default.
pub fn load_settings() -> Settings {
    let mut candidates = vec![std::path::PathBuf::from("crawler.json")];
    if let Ok(p) = std::env::var("CRAWLER_SETTINGS") {
        candidates.insert(0, std::path::PathBuf::from(p));
    }

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Settings>(&contents) {
                Ok(settings) => {
                    tracing::info!("settings loaded from {}", path.display());
                    return settings;
                }
                Err(e) => {
                    tracing::warn!("settings parse error at {}: {} — using defaults", path.display(), e);
                    return Settings::default();
                }
            },
            Err(_) => continue,
        }
    }

    Settings::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retry_codes_match_spec() {
        let s = Settings::default();
        assert_eq!(s.resolve_retry_http_codes(), vec![408, 429, 500, 502, 503, 504, 522, 524]);
    }

    #[test]
    fn per_domain_delay_overrides_global() {
        let mut s = Settings::default();
        s.download_delay = Some(0.0);
        let mut map = HashMap::new();
        map.insert("slow.test".to_string(), 2.0);
        s.download_delay_domain = Some(map);
        assert_eq!(s.resolve_delay_for_host("slow.test"), Duration::from_secs_f64(2.0));
        assert_eq!(s.resolve_delay_for_host("fast.test"), Duration::from_secs_f64(0.0));
    }

    #[test]
    fn pool_capacity_is_at_least_sixteen() {
        let mut s = Settings::default();
        s.concurrent_requests = Some(4);
        assert_eq!(s.resolve_pool_capacity(), 16);
        s.concurrent_requests = Some(20);
        assert_eq!(s.resolve_pool_capacity(), 40);
    }
}
