use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use rcrawl::{load_settings, CallbackStream, CallbackYield, InMemoryTask, Response, Scheduler, Spider};

/// Minimal built-in spider for ad hoc crawls from the command line: fetches
/// every seed URL and emits one item per response with its status and title.
struct FetchSpider {
    start_urls: Vec<String>,
}

#[async_trait]
impl Spider for FetchSpider {
    fn id(&self) -> &str {
        "fetch"
    }

    fn start_urls(&self) -> Vec<String> {
        self.start_urls.clone()
    }

    fn callback(&self, _name: &str, response: Response, _cb_kwargs: HashMap<String, Value>) -> CallbackStream {
        let item = serde_json::json!({
            "url": response.url,
            "status": response.status,
            "title": response.title(),
        });
        Box::pin(futures::stream::iter(vec![CallbackYield::Item(item)]))
    }

    async fn closed(&self, reason: &str) {
        tracing::info!(reason, "spider closed");
    }
}

fn urls_from_args() -> Vec<String> {
    std::env::args().skip(1).filter(|a| a.starts_with("http://") || a.starts_with("https://")).collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let settings = load_settings();
    let start_urls = urls_from_args();
    if start_urls.is_empty() {
        eprintln!("usage: rcrawl <url> [url...]");
        std::process::exit(2);
    }

    let scheduler = Scheduler::new(settings).await?;
    let spider: Arc<dyn Spider> = Arc::new(FetchSpider { start_urls });
    let task: Arc<dyn rcrawl::Task> = Arc::new(InMemoryTask::new("fetch", vec![]));

    let items = scheduler.run(spider, task).await;
    for item in items {
        println!("{item}");
    }

    Ok(())
}
