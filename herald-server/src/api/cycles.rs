//! Cycle API handlers.
//!
//! # Endpoints
//!
//! - `POST   /cycles`       create a cycle
//! - `GET    /cycles`       list cycles with their derived status
//! - `DELETE /cycles/{id}`  delete a cycle; its events are kept without a cycle

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post},
};
use compact_str::CompactString;
use herald_core::entities::cycle_records::CycleRecord;
use herald_core::store::EventStore;
use herald_sdk::objects::{CreateCycleRequest, CycleResponse};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::state::AppState;

/// Build the cycle API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cycles", post(create_cycle).get(list_cycles))
        .route("/cycles/{cycle_id}", delete(delete_cycle))
}

async fn create_cycle(
    state: State<AppState>,
    Json(body): Json<CreateCycleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::InvalidRequest("cycle name must not be empty"));
    }
    if body.ends_at < body.starts_at {
        return Err(ApiError::InvalidRequest("cycle cannot end before it starts"));
    }

    let cycle = CycleRecord {
        cycle_id: Uuid::now_v7(),
        name: body.name.trim().to_string(),
        starts_at: body.starts_at,
        ends_at: body.ends_at,
        default_participant_groups: body
            .default_participant_groups
            .into_iter()
            .map(CompactString::from)
            .collect(),
    };
    state.engine.store().create_cycle(&cycle).await?;
    tracing::info!(cycle_id = %cycle.cycle_id, name = %cycle.name, "Cycle created");

    Ok((
        StatusCode::CREATED,
        Json(cycle.to_response(OffsetDateTime::now_utc())),
    ))
}

async fn list_cycles(state: State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let now = OffsetDateTime::now_utc();
    let cycles: Vec<CycleResponse> = state
        .engine
        .store()
        .list_cycles()
        .await?
        .iter()
        .map(|cycle| cycle.to_response(now))
        .collect();
    Ok(Json(cycles))
}

async fn delete_cycle(
    state: State<AppState>,
    Path(cycle_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if state.engine.store().delete_cycle(cycle_id).await? {
        tracing::info!(cycle_id = %cycle_id, "Cycle deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("cycle not found"))
    }
}
