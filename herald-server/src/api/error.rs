//! Errors returned by API handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use herald_core::entities::event_records::ValidationError;
use herald_core::processors::{PublishError, ReconcileError, ScheduleError};
use herald_core::store::StoreError;

#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    Store(StoreError),
    Attendance(ReconcileError),
    NotFound(&'static str),
    InvalidRequest(&'static str),
    EventChannelClosed,
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl From<PublishError> for ApiError {
    fn from(e: PublishError) -> Self {
        match e {
            PublishError::Validation(e) => ApiError::Validation(e),
            PublishError::Store(e) => ApiError::Store(e),
        }
    }
}

impl From<ScheduleError> for ApiError {
    fn from(e: ScheduleError) -> Self {
        match e {
            ScheduleError::Validation(e) => ApiError::Validation(e),
            ScheduleError::Store(e) => ApiError::Store(e),
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::EventNotFound(event_id) => {
                ApiError::Validation(ValidationError::EventNotFound(event_id))
            }
            ReconcileError::Store(e) => ApiError::Store(e),
            other => ApiError::Attendance(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(e) => {
                let status = match e {
                    ValidationError::EventNotFound(_) | ValidationError::CycleNotFound(_) => {
                        StatusCode::NOT_FOUND
                    }
                    ValidationError::AlreadyPublished(_) => StatusCode::CONFLICT,
                    _ => StatusCode::UNPROCESSABLE_ENTITY,
                };
                (status, e.to_string()).into_response()
            }
            ApiError::Store(StoreError::Timeout(limit)) => {
                tracing::error!(?limit, "API store call timed out");
                (StatusCode::GATEWAY_TIMEOUT, "store did not respond in time").into_response()
            }
            ApiError::Store(e) => {
                tracing::error!(error = %e, "API store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            ApiError::Attendance(e) => {
                tracing::error!(error = %e, "API attendance error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, what).into_response(),
            ApiError::InvalidRequest(what) => {
                (StatusCode::UNPROCESSABLE_ENTITY, what).into_response()
            }
            ApiError::EventChannelClosed => {
                tracing::error!("API: event channel closed");
                (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response()
            }
        }
    }
}
