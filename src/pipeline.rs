//! Item Pipelines (spec §4.H): an ordered list of processors over extracted
//! items. Only `dict`-typed (here: `serde_json::Value::Object`) yields flow
//! through.

use async_trait::async_trait;

use crate::error::CrawlError;

#[async_trait]
pub trait Pipeline: Send + Sync {
    fn name(&self) -> &str;

    async fn open_spider(&self, _spider_id: &str) {}

    async fn close_spider(&self, _spider_id: &str) {}

    /// Process one item. `Err(CrawlError::DropItem(reason))` discards it
    /// (logged at INFO by the caller) without affecting later pipelines'
    /// view of subsequent items.
    async fn process_item(&self, item: serde_json::Value, spider_id: &str) -> Result<serde_json::Value, CrawlError>;
}

#[derive(Default)]
pub struct PipelineChain {
    entries: Vec<std::sync::Arc<dyn Pipeline>>,
}

impl PipelineChain {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn push(&mut self, pipeline: std::sync::Arc<dyn Pipeline>) {
        self.entries.push(pipeline);
    }

    pub async fn open_spider(&self, spider_id: &str) {
        for p in &self.entries {
            p.open_spider(spider_id).await;
        }
    }

    pub async fn close_spider(&self, spider_id: &str) {
        for p in &self.entries {
            p.close_spider(spider_id).await;
        }
    }

    /// Run `item` through every pipeline in order. Stops and logs at the
    /// first `DropItem`.
    pub async fn process(&self, mut item: serde_json::Value, spider_id: &str) -> Option<serde_json::Value> {
        for p in &self.entries {
            match p.process_item(item, spider_id).await {
                Ok(next) => item = next,
                Err(CrawlError::DropItem(reason)) => {
                    tracing::info!(pipeline = p.name(), reason, "item dropped");
                    return None;
                }
                Err(other) => {
                    tracing::warn!(pipeline = p.name(), error = %other, "pipeline error, dropping item");
                    return None;
                }
            }
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct UppercaseTitle;

    #[async_trait]
    impl Pipeline for UppercaseTitle {
        fn name(&self) -> &str {
            "uppercase_title"
        }

        async fn process_item(&self, mut item: serde_json::Value, _spider_id: &str) -> Result<serde_json::Value, CrawlError> {
            if let Some(title) = item.get("title").and_then(|v| v.as_str()) {
                item["title"] = json!(title.to_ascii_uppercase());
            }
            Ok(item)
        }
    }

    struct DropEmpty;

    #[async_trait]
    impl Pipeline for DropEmpty {
        fn name(&self) -> &str {
            "drop_empty"
        }

        async fn process_item(&self, item: serde_json::Value, _spider_id: &str) -> Result<serde_json::Value, CrawlError> {
            if item.get("title").and_then(|v| v.as_str()).map(str::is_empty).unwrap_or(true) {
                Err(CrawlError::DropItem("empty title".to_string()))
            } else {
                Ok(item)
            }
        }
    }

    #[tokio::test]
    async fn chain_runs_in_order_and_drops() {
        let mut chain = PipelineChain::new();
        chain.push(std::sync::Arc::new(DropEmpty));
        chain.push(std::sync::Arc::new(UppercaseTitle));

        let kept = chain.process(json!({"title": "hello"}), "spider-1").await;
        assert_eq!(kept.unwrap()["title"], "HELLO");

        let dropped = chain.process(json!({"title": ""}), "spider-1").await;
        assert!(dropped.is_none());
    }
}
