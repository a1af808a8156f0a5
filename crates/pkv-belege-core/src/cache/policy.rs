//! Request interception policy.

use reqwest::Method;

use super::request::Request;

/// How an intercepted request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Not intercepted: forwarded to the network, cache untouched.
    Passthrough,
    /// Try the network, refresh the cache on success, fall back to cache.
    NetworkFirst,
    /// Serve from cache, fill the cache from the network on a miss.
    CacheFirst,
}

impl Strategy {
    pub fn for_request(request: &Request) -> Self {
        if request.method != Method::GET {
            Strategy::Passthrough
        } else if request.is_navigation() || request.is_markup() {
            Strategy::NetworkFirst
        } else {
            Strategy::CacheFirst
        }
    }
}

/// A cached response to try when the network is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// The cached copy of the exact request.
    SameRequest,
    /// The cached root document of the app shell.
    RootDocument,
}

/// Fallbacks for network-first requests, tried in order.
pub const NETWORK_FIRST_FALLBACKS: [Fallback; 2] = [Fallback::SameRequest, Fallback::RootDocument];

impl Fallback {
    pub fn cache_key(&self, request: &Request, root_document: &str) -> String {
        match self {
            Fallback::SameRequest => request.cache_key(),
            Fallback::RootDocument => root_document.to_string(),
        }
    }
}
