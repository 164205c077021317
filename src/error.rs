//! Error and control-value types shared across the crawler core.
//!
//! Most of these are not "errors" in the exception sense — `IgnoreRequest`,
//! `RetryRequest`, `DropItem` and `CloseSpider` are control values middleware,
//! pipelines and spiders use to steer the scheduler. They are modeled as
//! variants of one enum (rather than panics/exceptions) per the tagged-union
//! middleware return protocol.

use thiserror::Error;

/// The kind of transport failure that triggered `process_exception`.
///
/// Curl's errno space doesn't exist in `reqwest`; this enum names the two
/// retry-relevant classes the original retry set keyed off (`{12, 28}`)
/// plus a catch-all for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connect/accept timed out.
    ConnectTimeout,
    /// Read/operation timed out mid-transfer.
    OperationTimeout,
    /// DNS, TLS, connection-reset, or any other transport failure.
    Other,
}

impl TransportErrorKind {
    /// Whether this kind is in the default retry set.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::ConnectTimeout | Self::OperationTimeout)
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            if err.is_connect() {
                Self::ConnectTimeout
            } else {
                Self::OperationTimeout
            }
        } else {
            Self::Other
        }
    }
}

/// Carrier passed to `process_exception` middleware hooks on transport failure.
#[derive(Debug)]
pub struct PerformError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl std::fmt::Display for PerformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for PerformError {}

/// Crawler-wide error and control-value type.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Malformed URL or unsupported scheme. Fails the call synchronously.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network/TLS/timeout failure. Enters exception middleware; retried
    /// when `kind.is_retryable()`, else surfaced.
    #[error("transport error: {0}")]
    TransportError(#[from] TransportErrorInner),

    /// Status in the configured retry set; handled by the Redirect/Retry engine.
    #[error("http status {0} is retryable")]
    HttpRetryable(u16),

    /// Control signal from middleware: drop the request silently (counted).
    #[error("request ignored: {0}")]
    IgnoreRequest(String),

    /// Control signal from exception middleware: force a retry pass.
    #[error("retry requested: {0}")]
    RetryRequest(String),

    /// From pipelines: discard an item, logged at INFO.
    #[error("item dropped: {0}")]
    DropItem(String),

    /// From callbacks: stop admitting new work for this spider.
    #[error("spider closed: {0}")]
    CloseSpider(String),

    /// Internal carrier passed to exception middleware.
    #[error("perform error: {0}")]
    Perform(#[from] PerformErrorInner),
}

/// Newtype wrappers so `#[from]` can apply even though `PerformError` isn't `std::error::Error`-derived via thiserror.
#[derive(Debug)]
pub struct TransportErrorInner(pub PerformError);
impl std::fmt::Display for TransportErrorInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
impl std::error::Error for TransportErrorInner {}

#[derive(Debug)]
pub struct PerformErrorInner(pub PerformError);
impl std::fmt::Display for PerformErrorInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
impl std::error::Error for PerformErrorInner {}

pub type CrawlResult<T> = std::result::Result<T, CrawlError>;
