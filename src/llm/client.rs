use async_trait::async_trait;
use futures_util::TryStreamExt;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE } };
use std::time::Duration;

use crate::error::BoxError;
use crate::llm::ChatCompletionRequest;
use crate::llm::sse::ByteStream;

/// Status and still-unread body of a relayed chat request.
pub struct UpstreamResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// How the orchestrator reaches the relay. An `Err` means the request could not be
/// delivered at all; HTTP error statuses come back as a normal response.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn send(&self, request: &ChatCompletionRequest) -> Result<UpstreamResponse, BoxError>;
}

/// Posts chat requests to a relay endpoint over HTTP.
pub struct HttpRelayClient {
    http: HttpClient,
    url: String,
}

impl HttpRelayClient {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Result<Self, BoxError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        let http = HttpClient::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Box::new(e) as BoxError)?;

        Ok(Self { http, url: url.into() })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RelayTransport for HttpRelayClient {
    async fn send(&self, request: &ChatCompletionRequest) -> Result<UpstreamResponse, BoxError> {
        info!(
            "Sending chat request to {} (model={}, messages={})",
            self.url,
            request.model,
            request.messages.len()
        );

        let resp = self.http.post(&self.url).json(request).send().await?;
        let status = resp.status().as_u16();
        debug!("Relay answered with status {}", status);

        let body = resp.bytes_stream().map_err(|e| Box::new(e) as BoxError);
        Ok(UpstreamResponse { status, body: Box::pin(body) })
    }
}
