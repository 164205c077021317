pub mod auth;
pub mod cookies;
pub mod error;
pub mod fetcher;
pub mod middleware;
pub mod pipeline;
pub mod preparer;
pub mod redirect_retry;
pub mod request;
pub mod response;
pub mod robots;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod spider;
pub mod work_source;

pub use auth::Auth;
pub use error::{CrawlError, CrawlResult, PerformError, TransportErrorKind};
pub use middleware::{Middleware, MiddlewareChain, Outcome};
pub use pipeline::{Pipeline, PipelineChain};
pub use request::{Body, Method, Request};
pub use response::Response;
pub use robots::RobotsTxt;
pub use scheduler::Scheduler;
pub use session::Session;
pub use settings::{load_settings, Settings};
pub use spider::{CallbackStream, CallbackYield, Spider};
pub use work_source::{InMemoryTask, RedisTask, Task};
