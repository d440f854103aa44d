use crate::error::GatewayError;
use crate::models::NormalizedVideo;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct TrendingQuery {
    #[serde(default)]
    pub region: String,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

type VideosResult = Result<Json<Vec<NormalizedVideo>>, GatewayError>;

pub async fn trending_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TrendingQuery>,
) -> VideosResult {
    state.client.trending(&query.region).await.map(Json)
}

pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> VideosResult {
    state.client.search(&query.q).await.map(Json)
}

pub async fn related_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> VideosResult {
    state.client.related(&id).await.map(Json)
}

pub async fn playlist_items_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> VideosResult {
    state.client.playlist_items(&id).await.map(Json)
}

pub async fn channel_videos_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> VideosResult {
    state.client.channel_videos(&id).await.map(Json)
}

pub async fn video_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, GatewayError> {
    Ok(match state.client.video_details(&id).await? {
        Some(video) => Json(video).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "No data available" })),
        )
            .into_response(),
    })
}
