//! Proxy-aware HTTP transport with retry
//!
//! Both the remote probe and the DNS provider talk HTTP through an
//! [`HttpTransport`]. The production implementation is [`ReqwestTransport`],
//! built by [`build_client`] from the optional proxy URL:
//!
//! | proxy setting          | behaviour                              |
//! |------------------------|----------------------------------------|
//! | empty / absent         | direct connection                      |
//! | `http://`, `https://`  | forward proxy (CONNECT for HTTPS)      |
//! | `socks5://`, `socks5h://` | SOCKS5 tunnel, user-info as credentials |
//! | anything else          | [`ProxyError::UnsupportedProxyScheme`] |
//!
//! [`ResilientClient`] wraps a transport with a [`RetryPolicy`].

use crate::error::{ProxyError, TransportError};
use async_trait::async_trait;
use reqwest::{Method, Url};
use std::sync::Arc;
use std::time::Duration;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// One outgoing request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Optional JSON body
    pub body: Option<serde_json::Value>,
    /// Optional bearer token for the `Authorization` header
    pub bearer_token: Option<String>,
}

impl HttpRequest {
    /// Create a bodyless request
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
            bearer_token: None,
        }
    }

    /// Shorthand for a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Attach a JSON body
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a bearer token
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

/// A fully read HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// Status code
    pub status: u16,
    /// Body as text
    pub body: String,
}

impl HttpReply {
    /// Create a reply
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 5xx
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Something that can carry one HTTP request
///
/// Implementations perform exactly one attempt; retrying is the caller's
/// concern ([`ResilientClient`], or the probe's own loop).
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send the request and read the whole body
    async fn send(&self, request: &HttpRequest) -> Result<HttpReply, TransportError>;
}

/// How a proxy URL was interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyMode {
    /// No proxy
    Direct,
    /// HTTP or HTTPS forward proxy
    Http(Url),
    /// SOCKS5 proxy (`socks5h` resolves names on the proxy)
    Socks5(Url),
}

impl ProxyMode {
    /// Parse the configured proxy setting
    pub fn parse(proxy: Option<&str>) -> Result<Self, ProxyError> {
        let raw = match proxy.map(str::trim) {
            None | Some("") => return Ok(Self::Direct),
            Some(raw) => raw,
        };

        let url = Url::parse(raw).map_err(|e| ProxyError::InvalidProxyUrl {
            url: raw.to_string(),
            reason: format!("{e}; must include a scheme, e.g. 'socks5://127.0.0.1:1080'"),
        })?;

        if url.host_str().is_none_or(str::is_empty) {
            return Err(ProxyError::InvalidProxyUrl {
                url: raw.to_string(),
                reason: "missing proxy host".to_string(),
            });
        }

        match url.scheme().to_ascii_lowercase().as_str() {
            "http" | "https" => Ok(Self::Http(url)),
            "socks5" | "socks5h" => Ok(Self::Socks5(url)),
            other => Err(ProxyError::UnsupportedProxyScheme(other.to_string())),
        }
    }
}

/// Build a `reqwest` client for the configured proxy
pub fn build_client(proxy: Option<&str>, timeout: Duration) -> Result<reqwest::Client, ProxyError> {
    let mode = ProxyMode::parse(proxy)?;
    let mut builder = reqwest::Client::builder().timeout(timeout);

    builder = match mode {
        ProxyMode::Direct => builder.no_proxy(),
        // Credentials in the URL's user-info are picked up by reqwest for both kinds.
        ProxyMode::Http(url) | ProxyMode::Socks5(url) => {
            tracing::debug!(
                "Using {} proxy at {}",
                url.scheme(),
                url.host_str().unwrap_or_default()
            );
            let proxy = reqwest::Proxy::all(url.as_str())
                .map_err(|e| ProxyError::ClientBuild(e.to_string()))?;
            builder.proxy(proxy)
        }
    };

    builder
        .build()
        .map_err(|e| ProxyError::ClientBuild(e.to_string()))
}

/// [`HttpTransport`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport honouring the proxy setting
    pub fn new(proxy: Option<&str>, timeout: Duration) -> Result<Self, ProxyError> {
        Ok(Self {
            client: build_client(proxy, timeout)?,
        })
    }

    /// Wrap an existing client
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpReply, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .header("Content-Type", "application/json");

        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Request(format!("failed to read response body: {e}")))?;

        Ok(HttpReply { status, body })
    }
}

/// Which replies are worth another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOn {
    /// Transport errors and 5xx; every other status is returned as-is
    ServerErrors,
    /// Transport errors and any non-2xx status
    AnyFailureStatus,
}

/// Delay growth between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay every time
    Fixed,
    /// `base * 2^attempt`
    Exponential,
}

/// Retry parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Delay growth
    pub backoff: Backoff,
    /// Retry predicate
    pub retry_on: RetryOn,
}

impl RetryPolicy {
    /// DNS provider policy: 3 retries, 1s doubling, retry on transport errors and 5xx
    pub const fn provider() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            backoff: Backoff::Exponential,
            retry_on: RetryOn::ServerErrors,
        }
    }

    /// Remote probe policy: 2 retries, fixed 2s, retry on any failure
    pub const fn probe() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(2),
            backoff: Backoff::Fixed,
            retry_on: RetryOn::AnyFailureStatus,
        }
    }

    /// Total attempts (first try plus retries)
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait after the zero-based `attempt` failed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => self
                .base_delay
                .saturating_mul(1_u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX)),
        }
    }

    /// Whether `reply` should be retried
    pub fn should_retry(&self, reply: &HttpReply) -> bool {
        match self.retry_on {
            RetryOn::ServerErrors => reply.is_server_error(),
            RetryOn::AnyFailureStatus => !reply.is_success(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::provider()
    }
}

/// Transport plus retry policy
#[derive(Clone)]
pub struct ResilientClient {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ResilientClient {
    /// Wrap a transport
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Build a `reqwest`-backed client for the proxy setting
    pub fn with_proxy(proxy: Option<&str>, policy: RetryPolicy) -> Result<Self, ProxyError> {
        let transport = ReqwestTransport::new(proxy, DEFAULT_REQUEST_TIMEOUT)?;
        Ok(Self::new(Arc::new(transport), policy))
    }

    /// The active retry policy
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send `request`, retrying per policy
    ///
    /// A reply that should not be retried is returned immediately, whatever
    /// its status. If the last attempt still yields a retryable status, that
    /// reply is returned. If every attempt failed at the transport level the
    /// result is [`TransportError::MaxRetriesExceeded`].
    pub async fn request(&self, request: &HttpRequest) -> Result<HttpReply, TransportError> {
        let attempts = self.policy.attempts();
        let mut last_error = String::new();

        for attempt in 0..attempts {
            let is_last = attempt + 1 == attempts;

            match self.transport.send(request).await {
                Ok(reply) if is_last || !self.policy.should_retry(&reply) => return Ok(reply),
                Ok(reply) => {
                    tracing::warn!(
                        "{} {} returned {} (attempt {}/{}), retrying",
                        request.method,
                        request.url,
                        reply.status,
                        attempt + 1,
                        attempts
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "{} {} failed (attempt {}/{}): {}",
                        request.method,
                        request.url,
                        attempt + 1,
                        attempts,
                        e
                    );
                    last_error = e.to_string();
                    if is_last {
                        break;
                    }
                }
            }

            tokio::time::sleep(self.policy.delay_after(attempt)).await;
        }

        Err(TransportError::MaxRetriesExceeded {
            attempts,
            last: last_error,
        })
    }
}
