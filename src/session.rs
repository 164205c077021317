//! Session (spec §6 external interfaces): a direct HTTP client sitting on
//! top of the same Preparer/Fetcher/Redirect-Retry stack the Scheduler
//! drives, for one-off requests outside a full spider crawl. Grounded in
//! `original_source/pycurl_session/session.py`'s `Session` class (`get`/
//! `post`/`put`/`patch`/`delete`/`head`/`options`, `set_cookie_db`,
//! `set_retry_times`, `set_timeout`, `set_proxy`, `clear_cookies`,
//! `unset_cookies`).
//!
//! `set_logger` from the original has no counterpart here: logging is the
//! ambient `tracing` subscriber installed once at process start (see
//! `main.rs`), not a per-session setting.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::cookies::store::CookieKey;
use crate::cookies::CookieStore;
use crate::error::CrawlError;
use crate::fetcher::Fetcher;
use crate::preparer::{Preparer, SessionDefaults};
use crate::redirect_retry::{apply_redirect, apply_retry, backoff_delay, RedirectStatus, RetryDecision};
use crate::request::{Body, Method, Request};
use crate::response::{assemble, Response};
use crate::settings::Settings;

pub struct Session {
    cookies: Arc<CookieStore>,
    fetcher: Fetcher,
    preparer: Preparer,
    defaults: SessionDefaults,
}

impl Session {
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        let cookies = Arc::new(CookieStore::open(&settings.resolve_cookies_store_db()).await?);
        let fetcher = Fetcher::new(settings.clone())?;
        let preparer = Preparer::new(Arc::clone(&cookies));
        let defaults = SessionDefaults::from_settings(&settings, settings.resolve_user_agent());
        Ok(Self { cookies, fetcher, preparer, defaults })
    }

    pub fn set_retry_times(&mut self, times: u32) {
        self.defaults.retry_times = times;
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.defaults.timeout = timeout;
    }

    pub fn set_proxy(&mut self, proxy: Option<String>) {
        self.defaults.proxy = proxy;
    }

    /// Repoint the cookie store at a different database, e.g. switching
    /// from `:memory:` to a durable file mid-run.
    pub async fn set_cookie_db(&mut self, db_path: &str) -> anyhow::Result<()> {
        let cookies = Arc::new(CookieStore::open(db_path).await?);
        self.preparer = Preparer::new(Arc::clone(&cookies));
        self.cookies = cookies;
        Ok(())
    }

    pub async fn clear_cookies(&self, session_id: &str) -> rusqlite::Result<()> {
        self.cookies.clear(session_id).await
    }

    pub async fn unset_cookies(&self, session_id: &str, keys: Vec<CookieKey>) -> rusqlite::Result<()> {
        self.cookies.unset(session_id, keys).await
    }

    pub async fn get(&self, url: impl Into<String>) -> Result<Response, CrawlError> {
        self.execute(Request::get(url, "")).await
    }

    pub async fn head(&self, url: impl Into<String>) -> Result<Response, CrawlError> {
        let mut request = Request::get(url, "");
        request.method = Method::Head;
        self.execute(request).await
    }

    pub async fn options(&self, url: impl Into<String>) -> Result<Response, CrawlError> {
        let mut request = Request::get(url, "");
        request.method = Method::Options;
        self.execute(request).await
    }

    pub async fn delete(&self, url: impl Into<String>) -> Result<Response, CrawlError> {
        let mut request = Request::get(url, "");
        request.method = Method::Delete;
        self.execute(request).await
    }

    pub async fn post_form(&self, url: impl Into<String>, fields: Vec<(String, String)>) -> Result<Response, CrawlError> {
        self.execute(Request::form(url, "", fields)).await
    }

    pub async fn post_json(&self, url: impl Into<String>, json: Value) -> Result<Response, CrawlError> {
        self.execute(Request { method: Method::Post, body: Body::Json(json), ..Request::get(url, "") }).await
    }

    pub async fn put_json(&self, url: impl Into<String>, json: Value) -> Result<Response, CrawlError> {
        self.execute(Request { method: Method::Put, body: Body::Json(json), ..Request::get(url, "") }).await
    }

    pub async fn patch_json(&self, url: impl Into<String>, json: Value) -> Result<Response, CrawlError> {
        self.execute(Request { method: Method::Patch, body: Body::Json(json), ..Request::get(url, "") }).await
    }

    /// Prepare, fetch, and follow the same redirect/retry loop the
    /// Scheduler's dispatch runs, but with no middleware/pipeline chain —
    /// a Session call is a standalone fetch, not a crawl lineage.
    async fn execute(&self, request: Request) -> Result<Response, CrawlError> {
        let mut handle = self.preparer.prepare(request, &self.defaults).await?;

        loop {
            let permit = self.fetcher.acquire(&handle.domain).await;
            let outcome = self.fetcher.perform(&handle).await;
            drop(permit);

            let exchange = outcome.map_err(|e| CrawlError::TransportError(crate::error::TransportErrorInner(e)))?;
            let (response, cookie_rows) =
                assemble(&handle.request, exchange.effective_url, exchange.status, exchange.headers, exchange.body);
            if !cookie_rows.is_empty() {
                if let Err(e) = self.cookies.save(cookie_rows).await {
                    tracing::warn!("failed to persist cookies: {e}");
                }
            }

            if let RedirectStatus::Follow = apply_redirect(&mut handle, exchange.status, exchange.location.as_deref()) {
                continue;
            }

            if self.defaults.retry_http_codes.contains(&exchange.status) {
                if let RetryDecision::Retry = apply_retry(&mut handle) {
                    tokio::time::sleep(backoff_delay(handle.retry_count, &self.defaults.retry_backoff)).await;
                    continue;
                }
            }

            return Ok(response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_returns_body_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hi"))
            .mount(&server)
            .await;

        let mut settings = Settings::default();
        settings.robotstxt_obey = Some(false);
        let session = Session::new(settings).await.unwrap();
        let response = session.get(server.uri()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.text, "hi");
    }
}
