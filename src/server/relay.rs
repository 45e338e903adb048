use crate::error::RelayError;
use crate::llm::ChatCompletionRequest;
use axum::{
    body::{ Body, Bytes },
    extract::State,
    http::{ header::{ AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE }, Method, StatusCode },
    response::{ IntoResponse, Response },
    routing::{ any, get },
    Router,
};
use log::{ error, info, warn };
use reqwest::Client as HttpClient;
use std::error::Error;
use std::time::Duration;
use tower_http::cors::{ Any, CorsLayer };

pub const RELAY_ROUTE: &str = "/api/chat";

/// Shared, read-only state of the relay. The credential never leaves this struct.
#[derive(Clone)]
pub struct RelayState {
    http: HttpClient,
    upstream_url: String,
    api_key: Option<String>,
}

impl RelayState {
    pub fn new(
        upstream_url: impl Into<String>,
        api_key: Option<String>,
        connect_timeout: Duration
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let http = HttpClient::builder().connect_timeout(connect_timeout).build()?;
        let api_key = api_key.filter(|k| !k.trim().is_empty());

        if api_key.is_none() {
            warn!("Relay started WITHOUT an upstream API key. Chat requests will fail with 500.");
        }

        Ok(Self {
            http,
            upstream_url: upstream_url.into(),
            api_key,
        })
    }

    pub fn upstream_url(&self) -> &str {
        &self.upstream_url
    }
}

pub fn router(state: RelayState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route(RELAY_ROUTE, any(relay_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn relay_handler(
    State(state): State<RelayState>,
    method: Method,
    body: Bytes
) -> Response {
    match relay(&state, method, body).await {
        Ok(resp) => resp,
        Err(e) => {
            match &e {
                RelayError::MissingCredential => error!("Relay misconfigured: {}", e),
                RelayError::UpstreamUnreachable(source) => {
                    error!("Upstream {} unreachable: {}", state.upstream_url, source)
                }
                RelayError::InvalidBody(source) => warn!("Rejected chat request body: {}", source),
                RelayError::MethodNotAllowed => warn!("Rejected non-POST relay request"),
            }
            e.into_response()
        }
    }
}

async fn relay(state: &RelayState, method: Method, body: Bytes) -> Result<Response, RelayError> {
    if method != Method::POST {
        return Err(RelayError::MethodNotAllowed);
    }

    let api_key = state.api_key.as_deref().ok_or(RelayError::MissingCredential)?;

    let request: ChatCompletionRequest = serde_json
        ::from_slice(&body)
        .map_err(RelayError::InvalidBody)?;
    info!(
        "Relaying chat request (model={}, messages={}, bytes={})",
        request.model,
        request.messages.len(),
        body.len()
    );

    let upstream = state.http
        .post(&state.upstream_url)
        .header(AUTHORIZATION, format!("Bearer {}", api_key))
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .send().await
        .map_err(RelayError::UpstreamUnreachable)?;

    let status = upstream.status();
    if !status.is_success() {
        warn!("Upstream answered with status {}", status);
    }

    Ok(
        (
            status,
            [
                (CONTENT_TYPE, "text/event-stream"),
                (CACHE_CONTROL, "no-cache"),
            ],
            Body::from_stream(upstream.bytes_stream()),
        ).into_response()
    )
}
