//! Scheduler (spec §4.I): owns the pending queue, the per-spider `Task`
//! work source, the middleware/pipeline chains, and the dispatch loop that
//! ties the Preparer, Fetcher, Redirect/Retry Engine and spider callbacks
//! together.
//!
//! The original drives everything from one cooperative `pycurl.CurlMulti`
//! loop polling a `select()` timeout (`original_source/pycurl_session/
//! spider/crawler.py`). This crate takes the concurrency upgrade path spec
//! §9 sanctions: rather than one thread multiplexing handles, up to
//! `CONCURRENT_REQUESTS` dispatches run concurrently in a
//! `FuturesUnordered`, each owning its own redirect/retry re-dispatch cycle
//! end to end before reporting back into the pending queue. Dispatches
//! borrow the scheduler rather than being moved onto the tokio thread pool,
//! so this loop stays single-future-per-poll in spirit — just with many
//! lineages making independent progress instead of one.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde_json::Value;

use crate::cookies::CookieStore;
use crate::fetcher::Fetcher;
use crate::middleware::builtin::StatisticsMiddleware;
use crate::middleware::{MiddlewareChain, Outcome};
use crate::pipeline::PipelineChain;
use crate::preparer::{FetchHandle, Preparer, SessionDefaults};
use crate::redirect_retry::{apply_redirect, apply_retry, backoff_delay, RedirectStatus, RetryDecision};
use crate::request::Request;
use crate::response::{assemble, Response};
use crate::settings::Settings;
use crate::spider::{CallbackYield, Spider};
use crate::work_source::Task;

/// Outcome of one fully-resolved dispatch: prepare, fetch, and any number of
/// redirect/retry re-dispatches on the same handle, collapsed to a single
/// disposition for the driver loop.
enum Dispatched {
    Response { request: Request, response: Response },
    Replaced(Request),
    Ignored { reason: String },
    Errored { message: String },
    Closing(String),
}

type DispatchFuture<'a> = BoxFuture<'a, Dispatched>;

pub struct Scheduler {
    settings: Settings,
    cookies: Arc<CookieStore>,
    fetcher: Fetcher,
    preparer: Preparer,
    middleware: MiddlewareChain,
    pipelines: PipelineChain,
    defaults: SessionDefaults,
    /// Kept alongside the type-erased entry in `middleware` so `run()` can
    /// dump end-of-crawl counters without downcasting a `dyn Middleware`.
    stats: Arc<StatisticsMiddleware>,
}

impl Scheduler {
    /// Build a scheduler from resolved settings, wiring the built-in
    /// middleware stack (Statistics always, RobotsTxt when `ROBOTSTXT_OBEY`,
    /// Cookies debug logging) ahead of caller-pushed middleware/pipelines.
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        let cookies = Arc::new(CookieStore::open(&settings.resolve_cookies_store_db()).await?);
        let fetcher = Fetcher::new(settings.clone())?;
        let preparer = Preparer::new(Arc::clone(&cookies));
        let user_agent = settings.resolve_user_agent();
        let defaults = SessionDefaults::from_settings(&settings, user_agent.clone());

        let stats = Arc::new(StatisticsMiddleware::new());
        let mut middleware = MiddlewareChain::new();
        middleware.push(stats.clone());
        if settings.resolve_robotstxt_obey() {
            middleware.push(Arc::new(crate::middleware::builtin::RobotsTxtMiddleware::new(
                reqwest::Client::new(),
                user_agent,
            )));
        }
        middleware.push(Arc::new(crate::middleware::builtin::CookiesDebugMiddleware::new(
            settings.resolve_cookies_debug(),
        )));

        if settings.resolve_cookies_clear() {
            tracing::info!("COOKIES_CLEAR set; sessions start with an empty cookie store on first use");
        }

        Ok(Self { settings, cookies, fetcher, preparer, middleware, pipelines: PipelineChain::new(), defaults, stats })
    }

    pub fn middleware_mut(&mut self) -> &mut MiddlewareChain {
        &mut self.middleware
    }

    pub fn pipelines_mut(&mut self) -> &mut PipelineChain {
        &mut self.pipelines
    }

    pub fn cookies(&self) -> &Arc<CookieStore> {
        &self.cookies
    }

    /// Run `spider` to completion against `task`, returning every item that
    /// survived the pipeline chain. Seeds come from `spider.start_requests()`
    /// first, then `task.get()` once that generator and the pending queue
    /// both run dry.
    pub async fn run(&self, spider: Arc<dyn Spider>, task: Arc<dyn Task>) -> Vec<Value> {
        let spider_id = spider.id().to_string();
        self.pipelines.open_spider(&spider_id).await;

        let depth_priority = self.settings.resolve_depth_priority();
        let concurrency = self.settings.resolve_concurrent_requests().max(1);

        let mut pending: VecDeque<Request> = VecDeque::new();
        let mut items: Vec<Value> = Vec::new();
        let mut seeds = spider.start_requests().await;
        while let Some(yielded) = seeds.next().await {
            match yielded {
                CallbackYield::Request(r) => pending.push_back(r),
                // Seed-time items are rare but legal (a generator-style
                // `start_requests` override may yield one directly).
                CallbackYield::Item(v) => {
                    if let Some(kept) = self.pipelines.process(v, &spider_id).await {
                        items.push(kept);
                    }
                }
            }
        }

        let mut in_flight: FuturesUnordered<DispatchFuture<'_>> = FuturesUnordered::new();
        let mut closing: Option<String> = None;

        loop {
            if closing.is_none() {
                if pending.is_empty() {
                    if let Some(req) = task.get().await {
                        pending.push_back(req);
                    }
                }

                while in_flight.len() < concurrency {
                    let Some(request) = pending.pop_front() else { break };
                    match self.middleware.run_request(&request, &spider_id).await {
                        Outcome::Continue => {
                            let spider_id = spider_id.clone();
                            in_flight.push(Box::pin(self.dispatch_one(request, spider_id)));
                        }
                        Outcome::ReplaceRequest(new_request) => pending.push_front(new_request),
                        Outcome::ReplaceResponse(response) => {
                            self.run_callback(&spider, &request, response, depth_priority, &mut pending, &mut items, &spider_id).await;
                        }
                        Outcome::Ignore(reason) => tracing::debug!(url = %request.url, reason, "request ignored by middleware"),
                        Outcome::Close(reason) => {
                            closing = Some(reason);
                            break;
                        }
                        Outcome::Retry(_) | Outcome::Drop(_) => {}
                    }
                }
            }

            if in_flight.is_empty() {
                if closing.is_some() || pending.is_empty() {
                    break;
                }
                continue;
            }

            if let Some(dispatched) = in_flight.next().await {
                match dispatched {
                    Dispatched::Response { request, response } => {
                        self.run_callback(&spider, &request, response, depth_priority, &mut pending, &mut items, &spider_id).await;
                    }
                    Dispatched::Replaced(new_request) => pending.push_front(new_request),
                    Dispatched::Ignored { reason } => tracing::debug!(reason, "dispatch ignored"),
                    Dispatched::Errored { message } => tracing::warn!(error = message, "dispatch failed"),
                    Dispatched::Closing(reason) => closing = Some(reason),
                }
            }
        }

        // Graceful shutdown (spec §4.I): anything still queued with
        // provenance from an external work source is handed back so it
        // isn't lost.
        for request in pending {
            if let Some(origin) = request.origin_url {
                task.put(origin).await;
            }
        }

        spider.closed(closing.as_deref().unwrap_or("finished")).await;
        self.pipelines.close_spider(&spider_id).await;
        tracing::info!(spider = %spider_id, stats = %self.stats.dump(), "crawl finished");
        items
    }

    /// Prepare, fetch, and loop through any redirects/retries for one
    /// request, ending in a final disposition. Never touches `pending`
    /// directly — derived requests/items from the eventual callback are
    /// handled by the caller via [`Self::run_callback`].
    async fn dispatch_one(&self, request: Request, spider_id: String) -> Dispatched {
        let mut handle = match self.preparer.prepare(request, &self.defaults).await {
            Ok(h) => h,
            Err(e) => return Dispatched::Errored { message: e.to_string() },
        };

        loop {
            let permit = self.fetcher.acquire(&handle.domain).await;
            let outcome = self.fetcher.perform(&handle).await;
            drop(permit);

            match outcome {
                Ok(exchange) => {
                    let (response, cookie_rows) =
                        assemble(&handle.request, exchange.effective_url, exchange.status, exchange.headers, exchange.body);
                    if !cookie_rows.is_empty() {
                        if let Err(e) = self.cookies.save(cookie_rows).await {
                            tracing::warn!("failed to persist cookies: {e}");
                        }
                    }

                    // Response middleware (reverse order) gets first look at
                    // every response, including redirects and retryable
                    // statuses; only once it has no opinion (`Continue`) does
                    // the response flow on to the Redirect/Retry transition.
                    match self.middleware.run_response(&handle.request, &response, &spider_id).await {
                        Outcome::Continue => {}
                        Outcome::ReplaceResponse(new_response) => {
                            return Dispatched::Response { request: handle.request, response: new_response }
                        }
                        Outcome::ReplaceRequest(new_request) => return Dispatched::Replaced(new_request),
                        Outcome::Ignore(reason) => return Dispatched::Ignored { reason },
                        Outcome::Close(reason) => return Dispatched::Closing(reason),
                        Outcome::Retry(_) => {
                            if let RetryDecision::Retry = apply_retry(&mut handle) {
                                tokio::time::sleep(backoff_delay(handle.retry_count, &self.defaults.retry_backoff)).await;
                                continue;
                            }
                            return Dispatched::Response { request: handle.request, response };
                        }
                        Outcome::Drop(_) => return Dispatched::Ignored { reason: "dropped by response middleware".into() },
                    }

                    match apply_redirect(&mut handle, exchange.status, exchange.location.as_deref()) {
                        RedirectStatus::Follow => {
                            self.refresh_cookie_header(&mut handle).await;
                            continue;
                        }
                        RedirectStatus::ChainTooLong => {
                            tracing::warn!(url = %handle.final_url, "redirect chain too long, stopping");
                        }
                        RedirectStatus::None => {}
                    }

                    if self.defaults.retry_http_codes.contains(&exchange.status) {
                        if let RetryDecision::Retry = apply_retry(&mut handle) {
                            tokio::time::sleep(backoff_delay(handle.retry_count, &self.defaults.retry_backoff)).await;
                            continue;
                        }
                    }

                    return Dispatched::Response { request: handle.request, response };
                }
                Err(perform_err) => {
                    let exception_outcome = self.middleware.run_exception(&handle.request, &perform_err, &spider_id).await;
                    let should_retry = match &exception_outcome {
                        Outcome::Retry(_) => true,
                        Outcome::Continue => perform_err.kind.is_retryable(),
                        _ => false,
                    };
                    match exception_outcome {
                        Outcome::ReplaceRequest(new_request) => return Dispatched::Replaced(new_request),
                        Outcome::ReplaceResponse(response) => return Dispatched::Response { request: handle.request, response },
                        Outcome::Ignore(reason) => return Dispatched::Ignored { reason },
                        Outcome::Close(reason) => return Dispatched::Closing(reason),
                        Outcome::Continue | Outcome::Retry(_) | Outcome::Drop(_) => {}
                    }

                    if should_retry {
                        if let RetryDecision::Retry = apply_retry(&mut handle) {
                            tokio::time::sleep(backoff_delay(handle.retry_count, &self.defaults.retry_backoff)).await;
                            continue;
                        }
                    }
                    return Dispatched::Errored { message: perform_err.to_string() };
                }
            }
        }
    }

    /// Re-query the cookie store for `handle.final_url` and rebuild its
    /// `Cookie` header from scratch (spec §4.E: "drop cookies from the old
    /// header and re-fetch for the new URL from the store"). Safe to call on
    /// every followed redirect, same-host or not: seed cookies are persisted
    /// to the store at prepare time, so nothing is lost by rebuilding here.
    async fn refresh_cookie_header(&self, handle: &mut FetchHandle) {
        let cookie_map = self.cookies.get(&handle.session_id, &handle.final_url, None).await.unwrap_or_default();
        handle.final_headers.retain(|(k, _)| !k.eq_ignore_ascii_case("cookie"));
        if !cookie_map.is_empty() {
            let header = cookie_map.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("; ");
            handle.final_headers.push(("Cookie".to_string(), header));
        }
    }

    /// Run the spider callback for a completed response, draining its
    /// generator fully: `Request` yields join `pending` (front for DFO, back
    /// for BFO), `Item` yields run through the pipeline chain.
    #[allow(clippy::too_many_arguments)]
    async fn run_callback(
        &self,
        spider: &Arc<dyn Spider>,
        request: &Request,
        response: Response,
        depth_priority: u8,
        pending: &mut VecDeque<Request>,
        items: &mut Vec<Value>,
        spider_id: &str,
    ) {
        let mut stream = spider.callback(&request.callback, response, request.cb_kwargs.clone());
        while let Some(yielded) = stream.next().await {
            match yielded {
                CallbackYield::Request(mut new_request) => {
                    if new_request.referer.is_none() {
                        new_request.referer = Some(request.url.clone());
                    }
                    // URL_PERSIST (spec §4.G): only propagate provenance
                    // when the spider opts in, and only unless this derived
                    // request explicitly opts back out via its own meta.
                    let persist = new_request.meta.url_persist.unwrap_or_else(|| spider.url_persist());
                    if persist && new_request.origin_url.is_none() {
                        new_request.origin_url = request.origin_url.clone();
                    }
                    if depth_priority != 0 {
                        pending.push_front(new_request);
                    } else {
                        pending.push_back(new_request);
                    }
                }
                CallbackYield::Item(value) => {
                    if let Some(kept) = self.pipelines.process(value, spider_id).await {
                        items.push(kept);
                    }
                }
            }
        }
    }
}
