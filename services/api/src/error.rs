use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lune_core::store::StoreError;
use serde::Serialize;

use crate::routes::ReportStatus;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_status: Option<ReportStatus>,
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Snapshot not found")]
    SnapshotNotFound,

    #[error("Report not generated for this interview")]
    ReportNotGenerated,

    /// Both report models failed. The snapshot is kept for a later retry.
    #[error("{0}")]
    GenerationFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, report_status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, None, message),
            Self::SnapshotNotFound => (
                StatusCode::NOT_FOUND,
                Some(ReportStatus::Pending),
                "Snapshot not found".to_string(),
            ),
            Self::ReportNotGenerated => (
                StatusCode::NOT_FOUND,
                None,
                "Report not generated for this interview".to_string(),
            ),
            Self::GenerationFailed(message) => {
                tracing::error!(error = %message, "report generation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Some(ReportStatus::Failed),
                    message,
                )
            }
            Self::Store(StoreError::InvalidId(id)) => (
                StatusCode::BAD_REQUEST,
                None,
                format!("Invalid interview id '{}'", id),
            ),
            Self::Store(err) => {
                tracing::error!(error = %err, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    None,
                    "Storage unavailable".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            ok: false,
            report_status,
            error: message,
        });
        (status, body).into_response()
    }
}
