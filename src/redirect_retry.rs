//! Redirect/Retry Engine (spec §4.E): state transitions on 3xx / retryable
//! status / transport error, method-rewrite rules, backoff.

use std::time::Duration;

use crate::cookies::domain::is_same_or_ancestor;
use crate::preparer::FetchHandle;
use crate::request::Method;

const MAX_REDIRECTS: u32 = 5;
const DEFAULT_BACKOFF: &[f64] = &[5.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectStatus {
    None,
    Follow,
    ChainTooLong,
}

/// Whether `status` is a redirect status this engine handles.
fn is_redirect_status(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Apply the redirect transition in place on `handle` if `status` and
/// `handle.allow_redirects`/`meta.dont_redirect` call for it. Returns the new
/// effective URL to re-dispatch to, or `RedirectStatus::None` /
/// `ChainTooLong` when no further fetch should happen.
pub fn apply_redirect(
    handle: &mut FetchHandle,
    status: u16,
    location: Option<&str>,
) -> RedirectStatus {
    if !is_redirect_status(status) || !handle.allow_redirects || handle.meta.dont_redirect {
        return RedirectStatus::None;
    }
    let Some(location) = location else { return RedirectStatus::None };

    if handle.redirect_count >= MAX_REDIRECTS {
        return RedirectStatus::ChainTooLong;
    }

    let Ok(new_url) = handle.final_url.join(location) else {
        return RedirectStatus::None;
    };

    let old_host = handle.final_url.host_str().map(str::to_string);
    let new_host = new_url.host_str().map(str::to_string);
    let host_changed = old_host != new_host;

    let pre_redirect_url = handle.final_url.to_string();

    if host_changed {
        if let (Some(old), Some(new)) = (&old_host, &new_host) {
            if !is_same_or_ancestor(new, old) {
                // Drop the old host's cookie header; a fresh lookup happens
                // on re-dispatch against the new host.
                handle.final_headers.retain(|(k, _)| !k.eq_ignore_ascii_case("cookie"));
            }
            // If the new host is a subdomain of the old, the existing
            // cookie overlay is preserved (left untouched).
        }
        if !new_url.username().is_empty() {
            handle.auth = Some(crate::auth::Auth::Basic {
                username: new_url.username().to_string(),
                password: new_url.password().map(str::to_string),
            });
        }
        handle.domain = new_host.clone().unwrap_or_default();
        handle.top_domain = crate::cookies::domain::registrable_domain(&handle.domain);
    }

    // Method rewrite rules.
    let method = &handle.request.method;
    let new_method = match status {
        303 if *method != Method::Head => Method::Get,
        301 | 302 if *method == Method::Post => Method::Get,
        307 | 308 => method.clone(),
        _ => method.clone(),
    };
    if matches!(new_method, Method::Get) && !matches!(method, Method::Head | Method::Get) {
        handle.request.body = crate::request::Body::None;
    }
    handle.request.method = new_method;
    handle.request.url = new_url.to_string();
    handle.final_url = new_url;

    handle.final_headers.retain(|(k, _)| !k.eq_ignore_ascii_case("referer"));
    handle.final_headers.push(("Referer".to_string(), pre_redirect_url));

    handle.reset_for_redispatch();
    handle.redirect_count += 1;

    RedirectStatus::Follow
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    Retry,
    MaxRetriesExceeded,
}

/// Default retryable HTTP status set (spec §4.E).
pub fn default_retry_codes() -> &'static [u16] {
    &[408, 429, 500, 502, 503, 504, 522, 524]
}

/// Apply the retry transition: increment count, decide outcome. Does not
/// sleep — callers await `backoff_delay` themselves so the Fetcher driver
/// loop stays responsive to other lineages.
pub fn apply_retry(handle: &mut FetchHandle) -> RetryDecision {
    handle.retry_count += 1;
    if handle.retry_count > handle.max_retries {
        return RetryDecision::MaxRetriesExceeded;
    }
    handle.reset_for_redispatch();
    RetryDecision::Retry
}

/// `backoff[(retry-1) mod len]` seconds; a user-supplied list allows
/// arbitrary curves (spec §4.E).
pub fn backoff_delay(retry_count: u32, backoff: &[f64]) -> Duration {
    let table = if backoff.is_empty() { DEFAULT_BACKOFF } else { backoff };
    let idx = (retry_count.saturating_sub(1) as usize) % table.len();
    Duration::from_secs_f64(table[idx].max(0.0))
}
