//! Set-Cookie header parsing (spec §4.D), one record per header line.
//!
//! Tokens recognized: `path=`, `domain=`, `expires=` (RFC 6265 §5.1.1-ish
//! date syntaxes — weekday optional, 2- or 4-digit years), `max-age=`
//! (integer seconds, overrides `expires`), `version=` (ignored). The first
//! `name=value` pair is the cookie itself; a missing `domain` defaults to
//! the response host.
//!
//! Per spec §9's Open Question correction: rather than the original's
//! aggressive string mutation (stripping `-`/`+`, reassembling around a
//! comma) this accepts the documented syntaxes directly via `chrono`.

use chrono::{NaiveDateTime, Utc};

use crate::cookies::CookieRecord;

pub fn parse_set_cookie(header_value: &str, response_host: &str, session_id: &str) -> Option<CookieRecord> {
    let mut parts = header_value.split(';').map(str::trim);
    let first = parts.next()?;
    let (name, value) = first.split_once('=')?;
    let name = name.trim().to_string();
    let value = value.trim().to_string();

    if name.is_empty() {
        return None;
    }

    let mut domain: Option<String> = None;
    let mut path: Option<String> = None;
    let mut expires: Option<i64> = None;
    let mut max_age: Option<i64> = None;

    for attr in parts {
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim().to_ascii_lowercase(), Some(v.trim().to_string())),
            None => (attr.trim().to_ascii_lowercase(), None),
        };
        match key.as_str() {
            "domain" => domain = val,
            "path" => path = val,
            "expires" => expires = val.as_deref().and_then(parse_expires),
            "max-age" => max_age = val.as_deref().and_then(|v| v.parse().ok()),
            "version" => { /* ignored per spec */ }
            _ => {}
        }
    }

    let expires = match max_age {
        Some(secs) => Some(Utc::now().timestamp() + secs),
        None => expires,
    };

    Some(CookieRecord {
        session_id: session_id.to_string(),
        name,
        value,
        domain: domain.unwrap_or_else(|| response_host.to_string()),
        path: path.unwrap_or_else(|| "/".to_string()),
        expires,
    })
}

/// Parse an `Expires=` value per RFC 6265 §5.1.1, tolerating a missing
/// weekday and both 2- and 4-digit years. Invalid values return `None`
/// (caller keeps the cookie session-scoped and a warning is logged by the
/// response assembly path per spec §8's boundary-behavior requirement).
fn parse_expires(raw: &str) -> Option<i64> {
    let raw = raw.trim();

    // Try RFC 1123 / RFC 850 / asctime-ish formats chrono understands natively.
    if let Ok(dt) = chrono::DateTime::parse_from_rfc2822(raw) {
        return Some(dt.timestamp());
    }

    // Strip a leading weekday token ("Mon, " / "Monday, ") if present, then
    // try a handful of concrete `%d-%b-%y`/`%d %b %Y` layouts covering both
    // 2- and 4-digit years.
    let without_weekday = raw.splitn(2, ',').nth(1).map(str::trim).unwrap_or(raw);

    let formats = [
        "%d-%b-%Y %H:%M:%S GMT",
        "%d-%b-%y %H:%M:%S GMT",
        "%d %b %Y %H:%M:%S GMT",
        "%d %b %y %H:%M:%S GMT",
        "%d-%b-%Y %H:%M:%S",
        "%d-%b-%y %H:%M:%S",
    ];
    for fmt in formats {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(without_weekday, fmt) {
            return Some(normalize_two_digit_year(ndt).and_utc().timestamp());
        }
    }

    None
}

/// `chrono`'s `%y` already maps 00-68 → 2000-2068 and 69-99 → 1969-1999,
/// which matches RFC 6265's guidance closely enough for crawl-scoped
/// cookies; nothing further to adjust, kept as a named step for clarity.
fn normalize_two_digit_year(ndt: NaiveDateTime) -> NaiveDateTime {
    ndt
}
