//! Middleware/Pipeline Dispatch (spec §4.H): ordered request/response/
//! exception hooks, modeled as a tagged union rather than exceptions (spec
//! §9 Design Note "Exception control flow").

pub mod builtin;

use async_trait::async_trait;

use crate::error::PerformError;
use crate::request::Request;
use crate::response::Response;

/// Return value of every middleware hook.
#[derive(Debug)]
pub enum Outcome {
    /// Continue the chain unchanged.
    Continue,
    /// Replace the in-flight request with a new one.
    ReplaceRequest(Request),
    /// Short-circuit with a synthesized response.
    ReplaceResponse(Response),
    /// Drop the request silently (counted by Statistics).
    Ignore(String),
    /// Force a retry pass (only meaningful from `process_exception`).
    Retry(String),
    /// Drop an item (only meaningful from a pipeline, see [`crate::pipeline`]).
    Drop(String),
    /// Stop admitting new work for this spider.
    Close(String),
}

/// One middleware entry. All hooks default to `Continue` so an
/// implementation only overrides what it needs — mirroring the original's
/// optional `process_request`/`process_response`/`process_exception` hooks.
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    async fn process_request(&self, _request: &Request, _spider_id: &str) -> Outcome {
        Outcome::Continue
    }

    async fn process_response(&self, _request: &Request, _response: &Response, _spider_id: &str) -> Outcome {
        Outcome::Continue
    }

    async fn process_exception(&self, _request: &Request, _error: &PerformError, _spider_id: &str) -> Outcome {
        Outcome::Continue
    }

    /// Called on every entry, in order, once `run_request` has settled on a
    /// final disposition for the chain — regardless of which entry (or none)
    /// produced it. Lets a middleware like Statistics count an outcome it
    /// didn't itself return.
    async fn observe_request_outcome(&self, _request: &Request, _outcome: &Outcome, _spider_id: &str) {}
}

/// An ordered chain of middleware. Requests are run forward; responses and
/// exceptions run in reverse order (spec §5 ordering guarantee).
#[derive(Default)]
pub struct MiddlewareChain {
    entries: Vec<std::sync::Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn push(&mut self, middleware: std::sync::Arc<dyn Middleware>) {
        self.entries.push(middleware);
    }

    pub async fn run_request(&self, request: &Request, spider_id: &str) -> Outcome {
        let mut result = Outcome::Continue;
        for mw in &self.entries {
            match mw.process_request(request, spider_id).await {
                Outcome::Continue => continue,
                other => {
                    result = other;
                    break;
                }
            }
        }
        for mw in &self.entries {
            mw.observe_request_outcome(request, &result, spider_id).await;
        }
        result
    }

    pub async fn run_response(&self, request: &Request, response: &Response, spider_id: &str) -> Outcome {
        for mw in self.entries.iter().rev() {
            match mw.process_response(request, response, spider_id).await {
                Outcome::Continue => continue,
                other => return other,
            }
        }
        Outcome::Continue
    }

    pub async fn run_exception(&self, request: &Request, error: &PerformError, spider_id: &str) -> Outcome {
        for mw in self.entries.iter().rev() {
            match mw.process_exception(request, error, spider_id).await {
                Outcome::Continue => continue,
                other => return other,
            }
        }
        Outcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingMiddleware {
        name: String,
        log: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Middleware for RecordingMiddleware {
        fn name(&self) -> &str {
            &self.name
        }

        async fn process_request(&self, _request: &Request, _spider_id: &str) -> Outcome {
            self.log.lock().unwrap().push(format!("req:{}", self.name));
            Outcome::Continue
        }

        async fn process_response(&self, _request: &Request, _response: &Response, _spider_id: &str) -> Outcome {
            self.log.lock().unwrap().push(format!("resp:{}", self.name));
            Outcome::Continue
        }
    }

    #[tokio::test]
    async fn request_forward_response_reverse_order() {
        let log = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        chain.push(std::sync::Arc::new(RecordingMiddleware { name: "a".into(), log: log.clone() }));
        chain.push(std::sync::Arc::new(RecordingMiddleware { name: "b".into(), log: log.clone() }));

        let req = Request::get("https://a.test/", "parse");
        chain.run_request(&req, "spider-1").await;

        let (resp, _) = crate::response::assemble(&req, req.url.clone(), 200, vec![], vec![]);
        chain.run_response(&req, &resp, "spider-1").await;

        let recorded = log.lock().unwrap().clone();
        assert_eq!(recorded, vec!["req:a", "req:b", "resp:b", "resp:a"]);
    }
}
