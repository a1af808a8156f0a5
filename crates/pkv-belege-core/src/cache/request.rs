//! Intercepted requests and the responses handed back for them.

use reqwest::{Method, StatusCode};

/// How the request was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Top-level page navigation.
    Navigate,
    SameOrigin,
    NoCors,
}

/// What the requested resource will be used as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Document,
    Style,
    Script,
    Image,
    Manifest,
    Other,
}

impl Destination {
    /// Guess the destination from a path's file extension.
    pub fn from_path(path: &str) -> Self {
        let path = strip_query(path);
        let ext = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
        match ext.as_deref() {
            _ if path.ends_with('/') => Destination::Document,
            Some("html") | Some("htm") => Destination::Document,
            Some("css") => Destination::Style,
            Some("js") | Some("mjs") => Destination::Script,
            Some("png") | Some("jpg") | Some("jpeg") | Some("svg") | Some("ico") | Some("webp") => {
                Destination::Image
            }
            Some("json") | Some("webmanifest") => Destination::Manifest,
            _ => Destination::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub mode: RequestMode,
    pub destination: Destination,
}

impl Request {
    /// A same-origin GET whose destination is inferred from the path.
    pub fn get(path: &str) -> Self {
        Self {
            method: Method::GET,
            path: normalize_path(path),
            mode: RequestMode::SameOrigin,
            destination: Destination::from_path(path),
        }
    }

    /// A top-level navigation to `path`.
    pub fn navigate(path: &str) -> Self {
        Self {
            method: Method::GET,
            path: normalize_path(path),
            mode: RequestMode::Navigate,
            destination: Destination::Document,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Key under which the response for this request is cached.
    pub fn cache_key(&self) -> String {
        self.path.clone()
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Markup documents: typed as a document, an `.html` path, or a
    /// directory path (including the root).
    pub fn is_markup(&self) -> bool {
        let path = strip_query(&self.path);
        self.destination == Destination::Document || path.ends_with(".html") || path.ends_with('/')
    }
}

/// Turn the relative paths used by the app shell into absolute keys:
/// `./index.html` becomes `/index.html`, `./` and `.` become `/`.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    let without_dot = trimmed.strip_prefix("./").unwrap_or(trimmed);
    match without_dot {
        "" | "." => "/".to_string(),
        p if p.starts_with('/') => p.to_string(),
        p => format!("/{}", p),
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

impl Response {
    pub fn new(status: StatusCode, content_type: Option<String>, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            body,
            source: ResponseSource::Network,
        }
    }

    /// Only plain 200 responses are written to the cache.
    pub fn is_cacheable(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn from_cache(mut self) -> Self {
        self.source = ResponseSource::Cache;
        self
    }

    /// Same status, content type and bytes, regardless of origin.
    pub fn same_content(&self, other: &Response) -> bool {
        self.status == other.status
            && self.content_type == other.content_type
            && self.body == other.body
    }
}
