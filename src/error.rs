use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, warn};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Malformed request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("AI API error: {status}")]
    Upstream { status: u16 },
    #[error("AI API request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("AI API returned no content")]
    EmptyCompletion,
    #[error("AI response is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("AI response does not match the expected shape: {0}")]
    InvalidContent(String),
    #[error("Database error: {0}")]
    Persistence(#[from] sqlx::Error),
    #[error("Fatal error: {0}")]
    Fatal(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Error::InvalidContent(errors.to_string())
    }
}

/// A missing proctoring session or report is a 404; every other failure
/// collapses to a 500 carrying the message.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("request failed: {self}");
        } else {
            warn!("request rejected: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
