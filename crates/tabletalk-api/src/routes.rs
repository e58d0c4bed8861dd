//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression, body-size
//! limits, and the rate-limited JSON endpoints.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::rate_limit::{self, RateLimiter};
use crate::state::AppState;

/// Requests per second allowed on the JSON API.
const RATE_LIMIT_PER_SEC: u64 = 100;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // CORS: the chat page is served from this same process, so only
    // localhost origins (configured port plus port+1 for a dev server)
    // are allowed.
    let port = state.config.general.port;
    let dev_port = port.saturating_add(1);
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", port),
        format!("http://localhost:{}", port),
        format!("http://127.0.0.1:{}", dev_port),
        format!("http://localhost:{}", dev_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/ui", get(handlers::ui));

    let limiter = RateLimiter::new(RATE_LIMIT_PER_SEC);

    // Uploads carry whole data files; that one route gets the configured
    // upload limit instead of the global JSON limit.
    let max_upload = state.config.limits.max_upload_bytes;

    let api_routes = Router::new()
        .route(
            "/sessions",
            post(handlers::upload)
                .get(handlers::list_sessions)
                .layer(DefaultBodyLimit::max(max_upload)),
        )
        .route("/sessions/{id}", delete(handlers::delete_session))
        .route("/sessions/{id}/messages", post(handlers::send_message))
        .route("/sessions/{id}/schema", get(handlers::get_schema))
        .route("/sessions/{id}/history", get(handlers::get_history))
        .route("/sessions/{id}/download", get(handlers::download))
        .layer(axum::middleware::from_fn(
            rate_limit::rate_limit_middleware,
        ))
        .layer(axum::Extension(limiter));

    public_routes
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB for JSON bodies
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
