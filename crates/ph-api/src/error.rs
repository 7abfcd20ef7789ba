use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ph_core::LifecycleError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        use ph_infra::Error as RuntimeError;

        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Lifecycle(e) => match e {
                LifecycleError::Unauthorized(_) => StatusCode::FORBIDDEN,
                LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
                LifecycleError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                LifecycleError::NotFoundInRuntime { .. } => StatusCode::CONFLICT,
                LifecycleError::Runtime(RuntimeError::ResourceExhausted(_)) => {
                    StatusCode::INSUFFICIENT_STORAGE
                }
                LifecycleError::Runtime(RuntimeError::Unavailable(_) | RuntimeError::Timeout(_)) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                LifecycleError::Runtime(_) => StatusCode::BAD_GATEWAY,
                LifecycleError::Store(_)
                | LifecycleError::IdSpaceExhausted(_)
                | LifecycleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "intent failed");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
