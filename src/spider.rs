//! Spider surface (spec §6): class attributes `name`/`start_urls`, optional
//! `start_requests`, `parse(response)`, `closed(reason)`. Callbacks yield
//! Requests or items.
//!
//! Per spec §9 Design Note "Generator-driven callbacks": modeled as an
//! iterator object (`CallbackStream`, a boxed `futures::Stream`) the
//! scheduler polls one step at a time, rather than eagerly collecting a
//! `Vec` — interleaving other lineages' progress is a correctness property
//! (spec §5), not an optimization.

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use crate::request::Request;
use crate::response::Response;

/// One value yielded from a callback. `StopIteration`/`CloseSpider` are
/// represented by the stream simply ending, and by `Request::meta` or a
/// dedicated close signal respectively — `CloseSpider` itself surfaces as
/// `crate::error::CrawlError::CloseSpider` from the scheduler's callback
/// invocation, not as a stream item.
pub enum CallbackYield {
    Request(Request),
    Item(Value),
}

pub type CallbackStream = Pin<Box<dyn Stream<Item = CallbackYield> + Send>>;

#[async_trait]
pub trait Spider: Send + Sync {
    fn id(&self) -> &str;

    fn start_urls(&self) -> Vec<String> {
        Vec::new()
    }

    /// `URL_PERSIST` (spec §4.G): when true, derived requests inherit their
    /// ancestor's `origin_url` down the causal chain so a requeue-on-failure
    /// can find its way back to the external queue. A derived request's own
    /// `meta.url_persist` overrides this per call.
    fn url_persist(&self) -> bool {
        false
    }

    /// Default: one GET Request per `start_urls()` entry with no referer.
    /// Override for a generator-style seed list.
    async fn start_requests(&self) -> CallbackStream {
        let seeds: Vec<CallbackYield> = self
            .start_urls()
            .into_iter()
            .map(|url| CallbackYield::Request(Request::get(url, "parse")))
            .collect();
        Box::pin(futures::stream::iter(seeds))
    }

    /// Dispatch to the named callback (spec's `cb_kwargs` passed through).
    fn callback(&self, name: &str, response: Response, cb_kwargs: HashMap<String, Value>) -> CallbackStream;

    async fn closed(&self, _reason: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct EchoSpider;

    #[async_trait]
    impl Spider for EchoSpider {
        fn id(&self) -> &str {
            "echo"
        }

        fn start_urls(&self) -> Vec<String> {
            vec!["https://a.test/".to_string()]
        }

        fn callback(&self, _name: &str, response: Response, _cb_kwargs: HashMap<String, Value>) -> CallbackStream {
            let item = serde_json::json!({"url": response.url});
            Box::pin(futures::stream::iter(vec![CallbackYield::Item(item)]))
        }
    }

    #[tokio::test]
    async fn start_requests_default_from_start_urls() {
        let spider = EchoSpider;
        let mut stream = spider.start_requests().await;
        match stream.next().await {
            Some(CallbackYield::Request(req)) => assert_eq!(req.url, "https://a.test/"),
            _ => panic!("expected a Request yield"),
        }
        assert!(stream.next().await.is_none());
    }
}
