// packages/backend/src/error.rs
use crate::types::SlideIndex;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

/// Errors returned by the survey core to its caller. None of them is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurveyError {
    #[error("respondent already answered slide {slide}")]
    AlreadyAnswered { slide: SlideIndex },

    #[error("survey is already finished")]
    AlreadyFinished,

    #[error("no slide is currently active")]
    NoActiveSlide,

    #[error("answer must contain at least one value")]
    EmptyAnswer,

    #[error("slide {slide} accepts a single value, got {count}")]
    TooManyValues { slide: SlideIndex, count: usize },

    #[error("invalid survey token")]
    InvalidToken,

    #[error("invalid admin secret")]
    InvalidSecret,
}

/// Failure of a push channel. Ends the affected connection, never the hub.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel closed")]
    Closed,

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),
}

// HTTP-facing error for the JSON glue layer
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Survey(#[from] SurveyError),

    #[error("Failed to load survey definition: {0}")]
    SurveyLoad(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Survey(SurveyError::InvalidToken | SurveyError::InvalidSecret) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Survey(SurveyError::AlreadyAnswered { .. } | SurveyError::NoActiveSlide) => {
                StatusCode::CONFLICT
            }
            AppError::Survey(_) => StatusCode::BAD_REQUEST,
            AppError::SurveyLoad(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("HTTP Handler Error: {}", self);
        } else {
            tracing::debug!("HTTP Handler rejected request: {}", self);
        }

        // Load failures carry file paths; keep them server-side
        let message = match &self {
            AppError::SurveyLoad(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
