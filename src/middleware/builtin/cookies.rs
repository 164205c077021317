//! Cookies debug middleware (spec §4.H): logs request/response cookies when
//! `COOKIES_DEBUG` is enabled. Grounded in
//! `original_source/pycurl_session/spider/middleware.py`'s `Cookies`.

use async_trait::async_trait;

use super::super::{Middleware, Outcome};
use crate::request::Request;
use crate::response::Response;

pub struct CookiesDebugMiddleware {
    enabled: bool,
}

impl CookiesDebugMiddleware {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl Middleware for CookiesDebugMiddleware {
    fn name(&self) -> &str {
        "cookies_debug"
    }

    async fn process_request(&self, request: &Request, _spider_id: &str) -> Outcome {
        if self.enabled && !request.cookies.is_empty() {
            tracing::debug!(url = %request.url, cookies = ?request.cookies, "sending cookies");
        }
        Outcome::Continue
    }

    async fn process_response(&self, _request: &Request, response: &Response, _spider_id: &str) -> Outcome {
        if self.enabled && !response.cookies.is_empty() {
            tracing::debug!(url = %response.url, cookies = ?response.cookies, "received cookies");
        }
        Outcome::Continue
    }
}
