//! HTTP client abstraction for model provider communication.
//!
//! This module provides a trait-based abstraction over HTTP clients, enabling
//! dependency injection and easy mocking in tests.

use crate::error::ModelError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Status code and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for HTTP communication with external APIs.
///
/// This abstraction allows injecting mock HTTP clients for testing without
/// making real network requests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with JSON body and returns status and body.
    ///
    /// Non-2xx statuses are returned as responses, not errors. Only
    /// transport failures are errors.
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<HttpResponse, ModelError>;
}

/// HTTP client implementation using reqwest.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Creates a client whose requests fail after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ModelError::network("failed to build HTTP client").with_detail(e.to_string())
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<HttpResponse, ModelError> {
        let mut request = self.client.post(url);

        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let response = request.json(body).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}
