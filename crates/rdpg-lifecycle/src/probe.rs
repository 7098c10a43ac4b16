//! HTTP probes against the deployed test application
//!
//! The harness never parses responses; a probe only returns raw body text.

use crate::error::ProbeError;
use async_trait::async_trait;
use std::time::Duration;

/// HTTP method of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST` with a form body
    Post,
}

/// One probe request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Form fields, sent url-encoded with `POST`
    pub form: Vec<(String, String)>,
}

impl ProbeRequest {
    /// `GET url`
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            form: Vec::new(),
        }
    }

    /// `POST url` with `sql=<statement>`
    #[must_use]
    pub fn exec(url: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            form: vec![("sql".to_string(), sql.into())],
        }
    }

    /// Value of a form field, if present
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Probe capability
///
/// Implement this trait to observe the application. Transport failures are
/// returned as errors; HTTP error statuses are not, since the body text is
/// what gets matched.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Send a request and return the response body
    async fn send(&self, request: &ProbeRequest) -> Result<String, ProbeError>;
}

/// URLs of the test application's endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppEndpoints {
    base: String,
}

impl AppEndpoints {
    /// `https://<app>.<apps_domain>`
    #[must_use]
    pub fn new(app_name: &str, apps_domain: &str) -> Self {
        Self {
            base: format!("https://{app_name}.{apps_domain}"),
        }
    }

    /// Base URL
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Liveness check
    #[must_use]
    pub fn ping(&self) -> ProbeRequest {
        ProbeRequest::get(format!("{}/ping", self.base))
    }

    /// Reports the bound database URI
    #[must_use]
    pub fn uri(&self) -> ProbeRequest {
        ProbeRequest::get(format!("{}/uri", self.base))
    }

    /// Reads the database clock; only succeeds with a live connection
    #[must_use]
    pub fn timestamp(&self) -> ProbeRequest {
        ProbeRequest::get(format!("{}/timestamp", self.base))
    }

    /// Executes SQL through the application
    #[must_use]
    pub fn exec(&self, sql: impl Into<String>) -> ProbeRequest {
        ProbeRequest::exec(format!("{}/exec", self.base), sql)
    }
}

/// `reqwest`-backed probe
///
/// Certificates are not verified; platform routes commonly use
/// self-signed certificates in test environments.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    /// Create a probe whose individual requests give up after `request_timeout`
    ///
    /// # Errors
    /// `ProbeError::Setup` if the TLS backend cannot be initialized.
    pub fn new(request_timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(request_timeout)
            .build()
            .map_err(|e| ProbeError::Setup(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn send(&self, request: &ProbeRequest) -> Result<String, ProbeError> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url).form(&request.form),
        };

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(url = %request.url, %status, bytes = body.len(), "probe response");
        Ok(body)
    }
}
