mod admin;
mod health;
mod metrics;
mod videos;

pub use admin::{keys_handler, quota_handler, reset_keys_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use videos::{
    channel_videos_handler, playlist_items_handler, related_handler, search_handler,
    trending_handler, video_handler,
};

use crate::state::AppState;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/trending", get(trending_handler))
        .route("/search", get(search_handler))
        .route("/videos/{id}", get(video_handler))
        .route("/videos/{id}/related", get(related_handler))
        .route("/playlists/{id}/items", get(playlist_items_handler))
        .route("/channels/{id}/videos", get(channel_videos_handler))
        .route_layer(from_fn_with_state(Arc::clone(&state), rate_limit))
        .route("/quota", get(quota_handler))
        .route("/keys", get(keys_handler))
        .route("/keys/reset", post(reset_keys_handler));

    Router::new()
        .nest("/api", api)
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn rate_limit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let client_id = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "global".to_string());

    if !state.rate_limiter.check(&client_id) {
        tracing::warn!("Rate limit exceeded for {}", client_id);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded. Try again later.",
        )
            .into_response();
    }

    next.run(request).await
}
