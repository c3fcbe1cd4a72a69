use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use depthmatch_models::ModelError;

/// Errors raised while handling a request.
#[derive(thiserror::Error, Debug)]
pub enum ServeError {
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The multipart body lacks a required field.
    #[error("missing multipart field '{0}'")]
    MissingField(&'static str),

    #[error("invalid multipart body: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ServeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::Model(e) if e.kind().is_client_fault() => StatusCode::BAD_REQUEST,
            ServeError::Model(_) | ServeError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServeError::MissingField(_) | ServeError::Multipart(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = if status.is_server_error() {
            log::error!("request failed: {self}");
            "Internal server error".to_string()
        } else {
            log::warn!("rejected request: {self}");
            self.to_string()
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}
