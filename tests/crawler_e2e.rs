//! End-to-end scenarios driving the full Scheduler against a local
//! `wiremock` server: GET+200, redirect method rewrite, retry-then-success,
//! per-domain delay, robots.txt disallow, and cookie domain scoping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rcrawl::settings::Settings;
use rcrawl::work_source::InMemoryTask;
use rcrawl::{CallbackStream, CallbackYield, Request, Response, Scheduler, Spider, Task};

struct RecordingSpider {
    start: Vec<Request>,
    seen: Arc<Mutex<Vec<(u16, String)>>>,
}

#[async_trait]
impl Spider for RecordingSpider {
    fn id(&self) -> &str {
        "recording"
    }

    async fn start_requests(&self) -> CallbackStream {
        let reqs = self.start.clone();
        Box::pin(futures::stream::iter(reqs.into_iter().map(CallbackYield::Request)))
    }

    fn callback(&self, _name: &str, response: Response, _cb_kwargs: HashMap<String, Value>) -> CallbackStream {
        self.seen.lock().unwrap().push((response.status, response.url.clone()));
        let item = serde_json::json!({"status": response.status, "url": response.url, "body": response.text});
        Box::pin(futures::stream::iter(vec![CallbackYield::Item(item)]))
    }
}

fn base_settings() -> Settings {
    let mut settings = Settings::default();
    settings.robotstxt_obey = Some(false);
    settings.cookies_store_db = Some(":memory:".to_string());
    settings
}

#[tokio::test]
async fn get_200_json_round_trips_as_item() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&server)
        .await;

    let scheduler = Scheduler::new(base_settings()).await.unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let spider: Arc<dyn Spider> =
        Arc::new(RecordingSpider { start: vec![Request::get(format!("{}/data", server.uri()), "parse")], seen: seen.clone() });
    let task: Arc<dyn Task> = Arc::new(InMemoryTask::new("recording", vec![]));

    let items = scheduler.run(spider, task).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["status"], 200);
    assert!(items[0]["body"].as_str().unwrap().contains("\"ok\":true") || items[0]["body"].as_str().unwrap().contains("\"ok\": true"));
}

#[tokio::test]
async fn redirect_302_post_is_rewritten_to_get() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/home"))
        .mount(&server)
        .await;
    Mock::given(method("GET")).and(path("/home")).respond_with(ResponseTemplate::new(200).set_body_string("welcome")).mount(&server).await;

    let scheduler = Scheduler::new(base_settings()).await.unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let start = Request::form(format!("{}/login", server.uri()), "parse", vec![("user".into(), "bob".into())]);
    let spider: Arc<dyn Spider> = Arc::new(RecordingSpider { start: vec![start], seen: seen.clone() });
    let task: Arc<dyn Task> = Arc::new(InMemoryTask::new("recording", vec![]));

    let items = scheduler.run(spider, task).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["status"], 200);
    assert_eq!(items[0]["body"], "welcome");
}

#[tokio::test]
async fn retries_twice_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET")).and(path("/flaky")).respond_with(ResponseTemplate::new(200).set_body_string("recovered")).mount(&server).await;

    let mut settings = base_settings();
    settings.retry_times = Some(3);
    let scheduler = Scheduler::new(settings).await.unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let spider: Arc<dyn Spider> =
        Arc::new(RecordingSpider { start: vec![Request::get(format!("{}/flaky", server.uri()), "parse")], seen: seen.clone() });
    let task: Arc<dyn Task> = Arc::new(InMemoryTask::new("recording", vec![]));

    let items = scheduler.run(spider, task).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["body"], "recovered");
}

#[tokio::test]
async fn robots_disallow_blocks_the_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET")).and(path("/private/x")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

    let mut settings = base_settings();
    settings.robotstxt_obey = Some(true);
    let scheduler = Scheduler::new(settings).await.unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let spider: Arc<dyn Spider> =
        Arc::new(RecordingSpider { start: vec![Request::get(format!("{}/private/x", server.uri()), "parse")], seen: seen.clone() });
    let task: Arc<dyn Task> = Arc::new(InMemoryTask::new("recording", vec![]));

    let items = scheduler.run(spider, task).await;
    assert!(items.is_empty(), "disallowed request should never reach the callback");
}

#[tokio::test]
async fn per_domain_delay_is_honored_across_two_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

    let host = url::Url::parse(&server.uri()).unwrap().host_str().unwrap().to_string();
    let mut settings = base_settings();
    let mut delay_map = HashMap::new();
    delay_map.insert(host, 0.15);
    settings.download_delay_domain = Some(delay_map);
    settings.concurrent_requests = Some(1);

    let scheduler = Scheduler::new(settings).await.unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let start = vec![Request::get(server.uri(), "parse"), Request::get(format!("{}/2", server.uri()), "parse")];
    let spider: Arc<dyn Spider> = Arc::new(RecordingSpider { start, seen: seen.clone() });
    let task: Arc<dyn Task> = Arc::new(InMemoryTask::new("recording", vec![]));

    let start_time = std::time::Instant::now();
    let items = scheduler.run(spider, task).await;
    assert_eq!(items.len(), 2);
    assert!(start_time.elapsed() >= std::time::Duration::from_millis(140));
}

#[tokio::test]
async fn cookies_set_on_one_host_are_not_sent_to_an_unrelated_host() {
    let server = MockServer::start().await;
    let host = url::Url::parse(&server.uri()).unwrap().host_str().unwrap().to_string();
    Mock::given(method("GET"))
        .and(path("/set"))
        .respond_with(ResponseTemplate::new(200).insert_header("Set-Cookie", format!("sid=abc123; Domain={host}; Path=/")))
        .mount(&server)
        .await;
    Mock::given(method("GET")).and(path("/check")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

    let scheduler = Scheduler::new(base_settings()).await.unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let start = vec![Request::get(format!("{}/set", server.uri()), "parse"), Request::get(format!("{}/check", server.uri()), "parse")];
    let spider: Arc<dyn Spider> = Arc::new(RecordingSpider { start, seen: seen.clone() });
    let task: Arc<dyn Task> = Arc::new(InMemoryTask::new("recording", vec![]));

    let items = scheduler.run(spider, task).await;
    assert_eq!(items.len(), 2);

    let cookies = scheduler.cookies().get("default", &url::Url::parse(&format!("{}/check", server.uri())).unwrap(), None).await.unwrap();
    assert_eq!(cookies.get("sid"), Some(&"abc123".to_string()));
}
