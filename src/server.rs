//! HTTP front-end.
//!
//! - `GET /?url=<feed or page>` - rewritten feed, or a 301 to the discovered feed
//! - `GET /health` - liveness probe

use axum::{
    extract::{ConnectInfo, RawQuery, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use url::{form_urlencoded, Url};

use crate::pipeline::{FeedRequest, Outcome, Pipeline, PipelineError};
use crate::util::parse_feed_url;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Client-visible request failure, rendered as `400` with a plain-text message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.message,
        )
            .into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        if err.is_blocked_host() {
            tracing::warn!(error = %err, "Refused feed request to blocked host");
        } else {
            tracing::info!(error = %err, "Feed request failed");
        }
        ApiError::bad_request(err.to_string())
    }
}

/// Builds the application router.
pub fn router(pipeline: Pipeline) -> Router {
    Router::new()
        .route("/", get(feed_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(pipeline))
}

/// Binds `addr` and serves until the process exits.
pub async fn serve(addr: SocketAddr, pipeline: Pipeline) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("Listening on http://{}", local_addr);

    axum::serve(
        listener,
        router(pipeline).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn feed_handler(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    uri: Uri,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    let params: Vec<(String, String)> =
        form_urlencoded::parse(query.as_deref().unwrap_or_default().as_bytes())
            .into_owned()
            .collect();

    let raw_url = params
        .iter()
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing url parameter"))?;

    let url = parse_feed_url(raw_url)
        .map_err(|e| ApiError::bad_request(format!("invalid url: {e}")))?;

    let request = FeedRequest {
        url,
        client_ip: client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr)),
    };

    match state.pipeline.process(&request).await? {
        Outcome::Feed { body, content_type } => {
            Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
        }
        Outcome::Redirect(feed_url) => {
            let location = redirect_location(uri.path(), &params, &feed_url);
            Ok((
                StatusCode::MOVED_PERMANENTLY,
                [(header::LOCATION, location)],
            )
                .into_response())
        }
    }
}

/// Client IP from the first `X-Forwarded-For` hop, else the peer address.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|forwarded| forwarded.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// Same path and query, with `url` replaced by the discovered feed.
fn redirect_location(path: &str, params: &[(String, String)], feed_url: &Url) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        if key == "url" {
            query.append_pair(key, feed_url.as_str());
        } else {
            query.append_pair(key, value);
        }
    }
    format!("{}?{}", path, query.finish())
}
