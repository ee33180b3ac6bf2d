//! Attendance API handlers.
//!
//! Attendance is tracked for one selected event at a time; selecting starts
//! a periodic refresh whose results are pushed over `/changes/ws`.
//!
//! # Endpoints
//!
//! - `POST   /events/{id}/select`              start tracking an event
//! - `DELETE /selection`                       stop tracking
//! - `GET    /events/{id}/attendance`          last known attendance
//! - `POST   /events/{id}/attendance/refresh`  fetch from every channel now

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use herald_core::store::EventStore;
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::state::AppState;

/// Build the attendance API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events/{event_id}/select", post(select_event))
        .route("/selection", delete(clear_selection))
        .route("/events/{event_id}/attendance", get(get_attendance))
        .route(
            "/events/{event_id}/attendance/refresh",
            post(refresh_attendance),
        )
}

#[derive(Debug, Serialize)]
struct SelectionResponse {
    selected: Option<Uuid>,
}

async fn select_event(
    state: State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .engine
        .store()
        .get_event(event_id)
        .await?
        .ok_or(ApiError::NotFound("event not found"))?;
    state.engine.reconciler().select(event_id).await;
    Ok((
        StatusCode::ACCEPTED,
        Json(SelectionResponse {
            selected: Some(event_id),
        }),
    ))
}

async fn clear_selection(state: State<AppState>) -> impl IntoResponse {
    let previous = state.engine.reconciler().deselect().await;
    if let Some(event_id) = previous {
        tracing::debug!(event_id = %event_id, "Attendance tracking stopped");
    }
    Json(SelectionResponse { selected: None })
}

async fn get_attendance(
    state: State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state
        .engine
        .reconciler()
        .snapshot(event_id)
        .await
        .ok_or(ApiError::NotFound("attendance has not been loaded for this event"))?;
    Ok(Json(snapshot))
}

async fn refresh_attendance(
    state: State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.engine.reconciler().refresh(event_id).await?;
    Ok(Json(view))
}
