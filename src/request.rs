//! Request data model (spec §3): URL, method, headers, cookies, body, meta.

use std::collections::HashMap;

use serde_json::Value;

/// Body payload carried by a `Request`. At most one variant is active.
#[derive(Debug, Clone)]
pub enum Body {
    Raw(Vec<u8>),
    Form(Vec<(String, String)>),
    Json(Value),
    Multipart(Vec<MultipartPart>),
    None,
}

#[derive(Debug, Clone)]
pub struct MultipartPart {
    pub field: String,
    pub value: MultipartValue,
}

#[derive(Debug, Clone)]
pub enum MultipartValue {
    Text(String),
    FilePath(std::path::PathBuf),
}

/// Recognized `meta` keys (spec §3), plus free-form entries.
#[derive(Debug, Clone, Default)]
pub struct Meta {
    /// Session id override for the cookie store.
    pub cookiejar: Option<String>,
    pub proxy: Option<String>,
    pub dont_redirect: bool,
    pub dont_retry: bool,
    pub max_retry_times: Option<u32>,
    pub http_version: Option<String>,
    /// Internal marker set by the RobotsTxt middleware for its own fetches.
    pub robots_txt: bool,
    /// Ancestor `origin_url` carried down the causal chain when URL
    /// persistence applies.
    pub origin_url: Option<String>,
    pub url_persist: Option<bool>,
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Other(s) => s.as_str(),
        }
    }

    pub fn to_reqwest(&self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
            Method::Other(s) => {
                reqwest::Method::from_bytes(s.as_bytes()).unwrap_or(reqwest::Method::GET)
            }
        }
    }
}

pub type CallbackId = String;

/// A request destined for the fetcher.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub cookies: HashMap<String, String>,
    pub body: Body,
    pub meta: Meta,
    /// Name of the spider callback to invoke with the resulting response.
    pub callback: CallbackId,
    pub cb_kwargs: HashMap<String, Value>,
    pub dont_filter: bool,
    /// Provenance for external-queue requeue-on-failure (spec §4.G).
    pub origin_url: Option<String>,
    /// Set by the scheduler when dispatched from a generator yield.
    pub referer: Option<String>,
}

impl Request {
    pub fn get(url: impl Into<String>, callback: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            headers: Vec::new(),
            cookies: HashMap::new(),
            body: Body::None,
            meta: Meta::default(),
            callback: callback.into(),
            cb_kwargs: HashMap::new(),
            dont_filter: false,
            origin_url: None,
            referer: None,
        }
    }

    /// `FormRequest`-style constructor (spec SUPPLEMENTED FEATURES): POST with
    /// a urlencoded form body.
    pub fn form(
        url: impl Into<String>,
        callback: impl Into<String>,
        fields: Vec<(String, String)>,
    ) -> Self {
        Self {
            method: Method::Post,
            body: Body::Form(fields),
            ..Self::get(url, callback)
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    /// Dedup key used by the Statistics middleware: `(method, url, callback, spider_id)`.
    pub fn dedup_key(&self, spider_id: &str) -> (String, String, String, String) {
        (
            self.method.as_str().to_string(),
            self.url.clone(),
            self.callback.clone(),
            spider_id.to_string(),
        )
    }
}
