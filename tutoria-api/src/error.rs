use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tutoria_core::WorkflowError;

#[derive(Debug)]
pub enum AppError {
    ConflictError(String),
    NotFoundError(String),
    AuthorizationError(String),
    ValidationError(String),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::InvalidTransition { .. } => AppError::ConflictError(err.to_string()),
            WorkflowError::NotFound(_) => AppError::NotFoundError(err.to_string()),
            WorkflowError::NotParticipant(_) => AppError::AuthorizationError(err.to_string()),
            WorkflowError::Validation(_) => AppError::ValidationError(err.to_string()),
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}
