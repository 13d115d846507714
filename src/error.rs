use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{tool} failed: {detail}")]
    UpstreamTool { tool: String, detail: String },

    #[error("staging failed during {stage}: {detail}")]
    Transfer { stage: String, detail: String },

    #[error("capacity exhausted: {0}")]
    Capacity(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("worker agent error: {0}")]
    Worker(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::UpstreamTool { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Transfer { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Capacity(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Permission(_) => StatusCode::FORBIDDEN,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Worker(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
