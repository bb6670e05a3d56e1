//! JSON envelope and error mapping shared by every route

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use stock_analysis::StockError;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// `{success, data?, error?, message?, cached?}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
            cached: None,
        }
    }

    /// Attach an explanation for degraded data
    pub fn with_message(mut self, message: Option<&str>) -> Self {
        self.message = message.map(str::to_string);
        self
    }

    /// Mark the payload as served past its refresh window
    pub fn stale(mut self, stale: bool) -> Self {
        self.cached = stale.then_some(true);
        self
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            message: None,
            cached: None,
        }
    }
}

/// Error returned by handlers
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<StockError> for AppError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::ValidationError(_) => Self::bad_request(err.to_string()),
            StockError::NotFound(_) => Self {
                status: StatusCode::NOT_FOUND,
                message: err.to_string(),
            },
            other => {
                tracing::error!(error = ?other, "Unhandled error");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: INTERNAL_ERROR_MESSAGE.to_string(),
                }
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::error(self.message))).into_response()
    }
}
