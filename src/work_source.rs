//! Work Sources / `Task` (spec §4.G): seed provider per spider — in-memory
//! list, or an external pop-based queue (Redis `LPOP`/`SPOP`).

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::request::Request;

/// Per-spider producer of Requests. `get()` returns `None` when exhausted.
#[async_trait]
pub trait Task: Send + Sync {
    fn spider_id(&self) -> &str;

    async fn get(&self) -> Option<Request>;

    /// Push a URL back onto the external queue on graceful shutdown (spec
    /// §4.I shutdown sequence). No-op for sources with no external queue.
    async fn put(&self, _origin_url: String) {}
}

/// Base variant: drains an internal deque seeded from
/// `spider.start_urls()`/`start_requests()`.
pub struct InMemoryTask {
    spider_id: String,
    queue: Mutex<VecDeque<Request>>,
}

impl InMemoryTask {
    pub fn new(spider_id: impl Into<String>, seeds: Vec<Request>) -> Self {
        Self { spider_id: spider_id.into(), queue: Mutex::new(seeds.into()) }
    }

    pub async fn push_front(&self, request: Request) {
        self.queue.lock().await.push_front(request);
    }

    pub async fn push_back(&self, request: Request) {
        self.queue.lock().await.push_back(request);
    }
}

#[async_trait]
impl Task for InMemoryTask {
    fn spider_id(&self) -> &str {
        &self.spider_id
    }

    async fn get(&self) -> Option<Request> {
        self.queue.lock().await.pop_front()
    }
}

/// How URLs are popped from the external list/set.
#[derive(Debug, Clone, Copy)]
pub enum RedisPop {
    /// `LPOP` — FIFO list.
    List,
    /// `SPOP` — unordered set.
    Set,
}

/// External-queue variant backed by Redis, additionally supporting `put()`
/// to push a URL back on graceful shutdown. Requests produced here carry
/// `origin_url = Some(url)` so URL persistence (spec §4.G) can track them
/// down the causal chain of derived Requests.
pub struct RedisTask {
    spider_id: String,
    client: redis::Client,
    key: String,
    pop: RedisPop,
}

impl RedisTask {
    pub fn new(spider_id: impl Into<String>, redis_url: &str, key: impl Into<String>, pop: RedisPop) -> redis::RedisResult<Self> {
        Ok(Self {
            spider_id: spider_id.into(),
            client: redis::Client::open(redis_url)?,
            key: key.into(),
            pop,
        })
    }
}

#[async_trait]
impl Task for RedisTask {
    fn spider_id(&self) -> &str {
        &self.spider_id
    }

    async fn get(&self) -> Option<Request> {
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("redis task: connection failed: {e}");
                return None;
            }
        };

        use redis::AsyncCommands;
        let url: Option<String> = match self.pop {
            RedisPop::List => conn.lpop(&self.key, None).await.ok().flatten(),
            RedisPop::Set => conn.spop(&self.key).await.ok().flatten(),
        };

        url.map(|u| {
            let mut req = Request::get(u.clone(), "parse");
            req.origin_url = Some(u);
            req
        })
    }

    async fn put(&self, origin_url: String) {
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("redis task: connection failed on put: {e}");
                return;
            }
        };
        use redis::AsyncCommands;
        let result: redis::RedisResult<()> = match self.pop {
            RedisPop::List => conn.rpush(&self.key, origin_url).await,
            RedisPop::Set => conn.sadd(&self.key, origin_url).await,
        };
        if let Err(e) = result {
            tracing::warn!("redis task: put failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_task_drains_in_order() {
        let task = InMemoryTask::new(
            "spider-1",
            vec![Request::get("https://a.test/1", "parse"), Request::get("https://a.test/2", "parse")],
        );
        assert_eq!(task.get().await.unwrap().url, "https://a.test/1");
        assert_eq!(task.get().await.unwrap().url, "https://a.test/2");
        assert!(task.get().await.is_none());
    }

    #[tokio::test]
    async fn push_front_takes_priority_dfo_style() {
        let task = InMemoryTask::new("spider-1", vec![Request::get("https://a.test/1", "parse")]);
        task.push_front(Request::get("https://a.test/0", "parse")).await;
        assert_eq!(task.get().await.unwrap().url, "https://a.test/0");
    }
}
