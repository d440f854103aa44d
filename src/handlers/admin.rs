use crate::models::{KeyStatus, QuotaSnapshot};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use std::sync::Arc;

pub async fn quota_handler(State(state): State<Arc<AppState>>) -> Json<QuotaSnapshot> {
    Json(state.client.quota_snapshot())
}

pub async fn keys_handler(State(state): State<Arc<AppState>>) -> Json<Vec<KeyStatus>> {
    Json(state.client.key_status())
}

pub async fn reset_keys_handler(State(state): State<Arc<AppState>>) -> Json<Vec<KeyStatus>> {
    state.client.reset_exhausted_keys();
    Json(state.client.key_status())
}
