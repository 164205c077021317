//! Response Assembler (spec §4.D): decode bytes via the charset chain,
//! extract Set-Cookie, build an immutable `Response`.

pub mod charset;
pub mod set_cookie;

use std::collections::HashMap;

use crate::cookies::CookieRecord;
use crate::request::Request;

/// Snapshot of the triggering request, attached to the assembled response
/// (spec §3: "request snapshot (URL, headers, cookies, origin_url)").
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub cookies: HashMap<String, String>,
    pub origin_url: Option<String>,
}

impl From<&Request> for RequestSnapshot {
    fn from(req: &Request) -> Self {
        Self {
            url: req.url.clone(),
            headers: req.headers.clone(),
            cookies: req.cookies.clone(),
            origin_url: req.origin_url.clone(),
        }
    }
}

/// Immutable response assembled from a completed fetch.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content: Vec<u8>,
    pub text: String,
    pub encoding: String,
    pub content_type: Option<String>,
    pub cookies: HashMap<String, String>,
    pub request: RequestSnapshot,
    pub meta: crate::request::Meta,
}

impl Response {
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.text)
    }

    /// `<title>` text, a thin accessor the original exposed for convenience;
    /// this is not HTML parsing (which is out of scope) — just a cheap
    /// substring scan, matching the opaque-parser boundary in spec §1.
    pub fn title(&self) -> Option<String> {
        let lower = self.text.to_ascii_lowercase();
        let start = lower.find("<title")?;
        let open_end = lower[start..].find('>')? + start + 1;
        let close = lower[open_end..].find("</title>")? + open_end;
        Some(self.text[open_end..close].trim().to_string())
    }

    /// Resolve a possibly-relative `href` against this response's URL.
    pub fn urljoin(&self, href: &str) -> Result<String, url::ParseError> {
        let base = url::Url::parse(&self.url)?;
        Ok(base.join(href)?.to_string())
    }
}

/// Assemble a `Response` from raw fetch output.
///
/// `raw_headers` preserves declaration order; only lines containing `:` are
/// retained by the caller before reaching here (spec §4.D).
pub fn assemble(
    req: &Request,
    effective_url: String,
    status: u16,
    raw_headers: Vec<(String, String)>,
    content: Vec<u8>,
) -> (Response, Vec<CookieRecord>) {
    let content_type = raw_headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| v.clone());

    let (text, encoding) = if content_type
        .as_deref()
        .map(|ct| ct.starts_with("text") || ct.contains("html") || ct.contains("json") || ct.contains("xml"))
        .unwrap_or(true)
    {
        charset::decode_with_chain(&content, content_type.as_deref())
    } else {
        (String::new(), "unknown".to_string())
    };

    let host = url::Url::parse(&effective_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();

    let session_id = req.meta.cookiejar.clone().unwrap_or_else(|| "default".to_string());
    let mut cookies = HashMap::new();
    let mut records = Vec::new();
    for (name, value) in raw_headers.iter().filter(|(k, _)| k.eq_ignore_ascii_case("set-cookie")) {
        if let Some(parsed) = set_cookie::parse_set_cookie(value, &host, &session_id) {
            cookies.insert(parsed.name.clone(), parsed.value.clone());
            records.push(parsed);
        }
    }

    let response = Response {
        url: effective_url,
        status,
        headers: raw_headers,
        content,
        text,
        encoding,
        content_type,
        cookies,
        request: RequestSnapshot::from(req),
        meta: req.meta.clone(),
    };

    (response, records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    #[test]
    fn title_extracts_text() {
        let req = Request::get("https://a.test/", "parse");
        let (resp, _) = assemble(
            &req,
            "https://a.test/".into(),
            200,
            vec![("Content-Type".into(), "text/html".into())],
            b"<html><head><title>Hello World</title></head></html>".to_vec(),
        );
        assert_eq!(resp.title(), Some("Hello World".to_string()));
    }

    #[test]
    fn json_accessor_parses_body() {
        let req = Request::get("https://a.test/get", "parse");
        let (resp, _) = assemble(
            &req,
            "https://a.test/get".into(),
            200,
            vec![("Content-Type".into(), "application/json".into())],
            br#"{"url":"https://a.test/get"}"#.to_vec(),
        );
        let json = resp.json().unwrap();
        assert_eq!(json["url"], "https://a.test/get");
    }

    #[test]
    fn urljoin_resolves_relative_href() {
        let req = Request::get("https://a.test/dir/page", "parse");
        let (resp, _) = assemble(&req, "https://a.test/dir/page".into(), 200, vec![], vec![]);
        assert_eq!(resp.urljoin("../other").unwrap(), "https://a.test/other");
    }
}
