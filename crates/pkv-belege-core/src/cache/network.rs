//! Network access for the cache manager.

use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use reqwest::{header, Client, Url};
use tracing::debug;

use super::request::{Request, Response};
use crate::error::FetchError;

/// HTTP request timeout in seconds.
/// Long enough for slow mobile links, short enough to fall back to the cache.
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Something that can perform a request against the origin.
///
/// Non-success statuses are responses, not errors; an error means the
/// origin could not be reached at all.
pub trait Network: Send + Sync + 'static {
    fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, FetchError>>;
}

/// Fetches from the deployed application origin over HTTP.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
    base_url: Url,
    offline: bool,
}

impl HttpNetwork {
    pub fn new(origin: &str) -> Result<Self, FetchError> {
        // Paths are joined relative to the origin, so it must end in a slash
        // to keep any sub-path the app is deployed under.
        let origin = if origin.ends_with('/') {
            origin.to_string()
        } else {
            format!("{}/", origin)
        };
        let base_url = Url::parse(&origin).map_err(|e| FetchError::InvalidUrl {
            path: origin.clone(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url,
            offline: false,
        })
    }

    /// When offline, every fetch fails as unreachable without a request.
    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    fn url_for(&self, request: &Request) -> Result<Url, FetchError> {
        self.base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|e| FetchError::InvalidUrl {
                path: request.path.clone(),
                reason: e.to_string(),
            })
    }

    async fn send(&self, request: &Request) -> Result<Response, FetchError> {
        if self.offline {
            return Err(FetchError::Unreachable(request.path.clone()));
        }
        let url = self.url_for(request)?;
        debug!(method = %request.method, url = %url, "Fetching from network");

        let response = self
            .client
            .request(request.method.clone(), url)
            .send()
            .await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let body = response.bytes().await?.to_vec();

        Ok(Response::new(status, content_type, body))
    }
}

impl Network for HttpNetwork {
    fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, FetchError>> {
        self.send(request).boxed()
    }
}
