pub mod config;
pub mod error;
pub mod pipeline;
pub mod retry;
pub mod upload;
pub mod validation;
pub mod ws;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::pipeline::Pipeline;

/// Room for multipart boundaries and headers on top of the audio itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let pipeline = Pipeline::from_config(&config)?;
        Ok(Self {
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
        })
    }
}

/// Per-request id, assigned by [`add_request_id`] and echoed as `x-request-id`
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

pub async fn health_check() -> &'static str {
    "ok"
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let Some(allowed_origins) = &config.cors_allowed_origins else {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        return base.allow_origin(Any);
    };

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS is empty, falling back to permissive CORS");
        base.allow_origin(Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(AllowOrigin::list(origins))
    }
}

/// Build the router with both transports and the shared middleware stack
pub fn app(state: AppState) -> Router {
    let config = state.config.clone();
    let upload_limit = config.max_audio_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES);

    // The upload route outlives the general request timeout while it retries
    let upload = Router::new()
        .route(
            "/upload-audio/",
            post(upload::upload_audio).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .layer(TimeoutLayer::new(config.upload_timeout()));

    let short_lived = Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws::ws_handler))
        .layer(TimeoutLayer::new(config.request_timeout()));

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config))
        .into_inner();

    Router::new()
        .merge(short_lived)
        .merge(upload)
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state)
}
