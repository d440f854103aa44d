use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

// Fatal at start-up, never raised per request
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("At least one API key is required")]
    NoApiKeys,
    #[error("Invalid upstream base url: {0}")]
    InvalidBaseUrl(String),
    #[error("Failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

// Contract violations by the caller. Expected upstream failures never end up here.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Required parameter {0} is missing")]
    MissingParameter(&'static str),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug, Clone)]
pub enum DedupError {
    #[error("In-flight request for {0} did not complete: {1}")]
    ProducerFailed(String, String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        tracing::warn!("Rejected request: {}", self);

        let status = match self {
            GatewayError::MissingParameter(_) => StatusCode::BAD_REQUEST,
            GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            axum::Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
