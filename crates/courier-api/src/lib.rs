pub mod auth;
pub mod chats;
pub mod error;
pub mod messages;
pub mod middleware;

use std::time::Duration;

use axum::http::{HeaderName, Method, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::auth::AppState;
use crate::middleware::require_identity;

/// Build the complete router: open endpoints, identity-gated endpoints, and
/// the permissive CORS policy (any origin, 24h preflight cache). OPTIONS
/// preflights are answered by the CORS layer before routing.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("x-user-id")])
        .max_age(Duration::from_secs(86_400));

    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth", post(auth::authenticate))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/chats", get(chats::list_chats).post(chats::chat_action))
        .route("/messages", get(messages::history).post(messages::send))
        .layer(axum::middleware::from_fn(require_identity))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Format a stored SQLite timestamp ("YYYY-MM-DD HH:MM:SS[.SSS]", UTC) as
/// wall-clock "HH:MM".
pub(crate) fn clock_time(stored: &str) -> String {
    chrono::NaiveDateTime::parse_from_str(stored, "%Y-%m-%d %H:%M:%S%.f")
        .map(|dt| dt.format("%H:%M").to_string())
        .unwrap_or_else(|e| {
            tracing::warn!("Unparseable timestamp '{}': {}", stored, e);
            String::new()
        })
}
