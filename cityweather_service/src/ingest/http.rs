/// HTTP GET capability.
///
/// API clients depend on `HttpGet` rather than on `reqwest` directly, so the
/// status classification and credential checks can be exercised without a
/// network. `ReqwestHttp` is the blocking implementation used by the daemon.

use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

/// Status and body of a completed request. Non-2xx statuses are not errors
/// at this layer; classifying them is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// The request never produced a response (DNS, connect, timeout, body read).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

pub trait HttpGet {
    fn get(&self, url: &Url) -> Result<HttpResponse, TransportError>;
}

impl<T: HttpGet + ?Sized> HttpGet for &T {
    fn get(&self, url: &Url) -> Result<HttpResponse, TransportError> {
        (**self).get(url)
    }
}

/// Blocking `reqwest` client with a bounded per-request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestHttp {
    client: reqwest::blocking::Client,
}

impl ReqwestHttp {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cityweather_service/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpGet for ReqwestHttp {
    fn get(&self, url: &Url) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .header("Accept", "application/json")
            .send()
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| TransportError(format!("failed to read body: {}", e)))?;

        Ok(HttpResponse { status, body })
    }
}
