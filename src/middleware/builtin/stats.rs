//! Statistics middleware (spec §4.H): URL dedup, status/method/error
//! counters, end-of-run dump. Grounded in
//! `original_source/pycurl_session/spider/middleware.py`'s `Statistics`.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use super::super::{Middleware, Outcome};
use crate::error::PerformError;
use crate::request::Request;
use crate::response::Response;

#[derive(Debug, Default)]
struct Counters {
    status: std::collections::HashMap<u16, u64>,
    errors: u64,
    ignored: u64,
    fetched: u64,
}

pub struct StatisticsMiddleware {
    seen: Mutex<HashSet<(String, String, String, String)>>,
    counters: Mutex<Counters>,
}

impl Default for StatisticsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsMiddleware {
    pub fn new() -> Self {
        Self { seen: Mutex::new(HashSet::new()), counters: Mutex::new(Counters::default()) }
    }

    pub fn dump(&self) -> String {
        let counters = self.counters.lock().unwrap();
        let mut lines = vec![format!("fetched={} errors={} ignored={}", counters.fetched, counters.errors, counters.ignored)];
        let mut statuses: Vec<_> = counters.status.iter().collect();
        statuses.sort_by_key(|(code, _)| **code);
        for (code, count) in statuses {
            lines.push(format!("status[{code}]={count}"));
        }
        lines.join(" ")
    }
}

#[async_trait]
impl Middleware for StatisticsMiddleware {
    fn name(&self) -> &str {
        "statistics"
    }

    async fn process_request(&self, request: &Request, spider_id: &str) -> Outcome {
        if request.dont_filter {
            return Outcome::Continue;
        }
        let key = request.dedup_key(spider_id);
        let mut seen = self.seen.lock().unwrap();
        if !seen.insert(key) {
            return Outcome::Ignore("duplicate request".to_string());
        }
        Outcome::Continue
    }

    async fn process_response(&self, _request: &Request, response: &Response, _spider_id: &str) -> Outcome {
        let mut counters = self.counters.lock().unwrap();
        counters.fetched += 1;
        *counters.status.entry(response.status).or_insert(0) += 1;
        Outcome::Continue
    }

    async fn process_exception(&self, _request: &Request, _error: &PerformError, _spider_id: &str) -> Outcome {
        self.counters.lock().unwrap().errors += 1;
        Outcome::Continue
    }

    /// Counts every `Ignore` disposition — dedup's own or another
    /// middleware's (e.g. the robots gate) — exactly once, independent of
    /// chain order.
    async fn observe_request_outcome(&self, _request: &Request, outcome: &Outcome, _spider_id: &str) {
        if matches!(outcome, Outcome::Ignore(_)) {
            self.counters.lock().unwrap().ignored += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_get_is_ignored_unless_dont_filter() {
        let stats = StatisticsMiddleware::new();
        let req = Request::get("https://a.test/", "parse");
        assert!(matches!(stats.process_request(&req, "spider-1").await, Outcome::Continue));
        assert!(matches!(stats.process_request(&req, "spider-1").await, Outcome::Ignore(_)));

        let mut dont_filter_req = req.clone();
        dont_filter_req.dont_filter = true;
        assert!(matches!(stats.process_request(&dont_filter_req, "spider-1").await, Outcome::Continue));
    }

    #[tokio::test]
    async fn status_counters_accumulate() {
        let stats = StatisticsMiddleware::new();
        let req = Request::get("https://a.test/", "parse");
        let (resp, _) = crate::response::assemble(&req, req.url.clone(), 200, vec![], vec![]);
        stats.process_response(&req, &resp, "spider-1").await;
        stats.process_response(&req, &resp, "spider-1").await;
        assert!(stats.dump().contains("status[200]=2"));
    }

    #[tokio::test]
    async fn ignored_counter_tracks_chain_outcome_via_observe_hook() {
        use crate::middleware::MiddlewareChain;
        use std::sync::Arc;

        let stats = Arc::new(StatisticsMiddleware::new());
        let mut chain = MiddlewareChain::new();
        chain.push(stats.clone());

        let req = Request::get("https://a.test/", "parse");
        chain.run_request(&req, "spider-1").await;
        chain.run_request(&req, "spider-1").await; // duplicate -> ignored
        assert!(stats.dump().contains("ignored=1"));
    }
}
