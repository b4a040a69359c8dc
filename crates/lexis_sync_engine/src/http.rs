//! HTTP transport implementation.
//!
//! This module maps the sync operations onto the remote REST API:
//!
//! - `PUT {base}/api/v2/{resource}/{uid}` with the record as JSON
//! - `GET {base}/api/v2/{resource}/pull?since={t}&last_id={uid}`
//!
//! The actual HTTP client is abstracted via a trait so the transport can
//! run over reqwest in production and over an in-process server in tests.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use async_trait::async_trait;
use lexis_sync_protocol::{ProtocolError, PullPage, PullQuery, SyncRecord, SyncStream};
pub use lexis_sync_protocol::{API_KEY_HEADER, SECRET_KEY_HEADER};
use parking_lot::RwLock;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const MAX_ERROR_BODY: usize = 512;

/// HTTP method used by the sync API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// PUT
    Put,
}

impl HttpMethod {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL including the query string.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Option<Vec<u8>>,
}

/// A received HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn error_body(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        text.chars().take(MAX_ERROR_BODY).collect()
    }
}

/// HTTP client abstraction.
///
/// Implementations must report an unreachable network as
/// [`SyncError::NoConnectivity`] and must return non-2xx responses as
/// `Ok` so the transport can classify them.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    async fn execute(&self, request: HttpRequest) -> SyncResult<HttpResponse>;
}

/// HTTP-based sync transport.
pub struct HttpTransport<C: HttpClient> {
    base_url: Url,
    api_key: Option<String>,
    secret_key: Option<String>,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns a fatal transport error if `base_url` is not an absolute URL.
    pub fn new(base_url: &str, client: C) -> SyncResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SyncError::transport_fatal(format!("invalid base url {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::transport_fatal(format!(
                "base url {base_url} cannot carry a path"
            )));
        }

        Ok(Self {
            base_url,
            api_key: None,
            secret_key: None,
            client,
            last_error: RwLock::new(None),
        })
    }

    /// Creates a transport from the endpoint and credentials in `config`.
    ///
    /// # Errors
    ///
    /// Returns a fatal transport error if the base URL is invalid.
    pub fn from_config(config: &SyncConfig, client: C) -> SyncResult<Self> {
        let mut transport = Self::new(&config.base_url, client)?;
        transport.api_key = config.api_key.clone();
        transport.secret_key = config.secret_key.clone();
        Ok(transport)
    }

    /// Sets the API credentials.
    pub fn with_credentials(
        mut self,
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.api_key = Some(api_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Returns the message of the last failed request, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Returns the URL a record is pushed to.
    pub fn record_url(&self, stream: SyncStream, uid: &str) -> SyncResult<Url> {
        self.endpoint(&[stream.resource(), uid])
    }

    /// Returns the URL of the pull page following `query`.
    pub fn pull_url(&self, stream: SyncStream, query: &PullQuery) -> SyncResult<Url> {
        let mut url = self.endpoint(&[stream.resource(), "pull"])?;
        url.set_query(Some(&query.to_query_string()));
        Ok(url)
    }

    fn endpoint(&self, tail: &[&str]) -> SyncResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::transport_fatal("base url cannot carry a path"))?
            .pop_if_empty()
            .extend(["api", "v2"])
            .extend(tail);
        Ok(url)
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("accept".to_string(), "application/json".to_string())];
        if let Some(key) = &self.api_key {
            headers.push((API_KEY_HEADER.to_string(), key.clone()));
        }
        if let Some(secret) = &self.secret_key {
            headers.push((SECRET_KEY_HEADER.to_string(), secret.clone()));
        }
        headers
    }

    async fn send(&self, method: HttpMethod, url: Url, body: Option<Vec<u8>>) -> SyncResult<HttpResponse> {
        let mut headers = self.headers();
        if body.is_some() {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }
        let request = HttpRequest {
            method,
            url: url.into(),
            headers,
            body,
        };

        debug!(method = %request.method, url = %request.url, "sending request");
        let result = self.client.execute(request).await.and_then(|response| {
            if response.is_success() {
                Ok(response)
            } else {
                Err(SyncError::Api {
                    status: response.status,
                    body: response.error_body(),
                })
            }
        });

        match &result {
            Ok(_) => *self.last_error.write() = None,
            Err(e) => *self.last_error.write() = Some(e.to_string()),
        }
        result
    }
}

#[async_trait]
impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    async fn push_record(&self, stream: SyncStream, record: &SyncRecord) -> SyncResult<()> {
        let url = self.record_url(stream, &record.uid)?;
        let body = serde_json::to_vec(record).map_err(ProtocolError::from)?;
        self.send(HttpMethod::Put, url, Some(body)).await?;
        Ok(())
    }

    async fn pull_page(&self, stream: SyncStream, query: &PullQuery) -> SyncResult<PullPage> {
        let url = self.pull_url(stream, query)?;
        let response = self.send(HttpMethod::Get, url, None).await?;
        PullPage::decode(&response.body).map_err(|e| SyncError::Parse(e.to_string()))
    }
}

/// HTTP client backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns a fatal transport error if the TLS backend cannot be
    /// initialized.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("lexis-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::transport_fatal(format!("failed to build http client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Put => reqwest::Method::PUT,
        };
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(error = %e, url = %request.url, "http request failed");
            if e.is_connect() {
                SyncError::NoConnectivity
            } else if e.is_timeout() {
                SyncError::transport_retryable(format!("request timed out: {e}"))
            } else if e.is_builder() {
                SyncError::transport_fatal(e.to_string())
            } else {
                SyncError::transport_retryable(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| SyncError::transport_retryable(format!("failed to read body: {e}")))?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Trait for servers that can answer loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles one request. `path_and_query` is e.g. `/api/v2/word/pull?since=0`.
    fn handle(
        &self,
        method: HttpMethod,
        path_and_query: &str,
        headers: &[(String, String)],
        body: &[u8],
    ) -> HttpResponse;
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn execute(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        let url = Url::parse(&request.url)
            .map_err(|e| SyncError::transport_fatal(format!("invalid url: {e}")))?;
        let path_and_query = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        Ok(self.server.handle(
            request.method,
            &path_and_query,
            &request.headers,
            request.body.as_deref().unwrap_or_default(),
        ))
    }
}
