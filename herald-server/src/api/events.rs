//! Event API handlers.
//!
//! # Endpoints
//!
//! - `POST   /events`                create an event, optionally publishing or scheduling it
//! - `GET    /events`                list events, optionally of one cycle
//! - `GET    /events/{id}`           show one event
//! - `PATCH  /events/{id}`           edit an event and push the edit to its channels
//! - `DELETE /events/{id}`           delete an event and its channel messages
//! - `POST   /events/{id}/publish`   publish to all or some channels
//! - `PUT    /events/{id}/schedule`  schedule publication
//! - `DELETE /events/{id}/schedule`  cancel a scheduled publication

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use compact_str::CompactString;
use herald_core::channels::ChannelFailure;
use herald_core::entities::event_records::{EventChanges, EventDraft, EventRecord};
use herald_core::processors::UpdateOptions;
use herald_core::store::EventStore;
use herald_sdk::objects::{
    ChannelFailureView, CreateEventRequest, EventResponse, OperationReport, PublishRequest,
    ScheduleRequest, UpdateEventRequest,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::state::AppState;

/// Build the event API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events", post(create_event).get(list_events))
        .route(
            "/events/{event_id}",
            get(get_event).patch(update_event).delete(delete_event),
        )
        .route("/events/{event_id}/publish", post(publish_event))
        .route(
            "/events/{event_id}/schedule",
            put(schedule_event).delete(cancel_schedule),
        )
}

fn groups(groups: Vec<String>) -> Vec<CompactString> {
    groups.into_iter().map(CompactString::from).collect()
}

fn failure_views(errors: &[ChannelFailure]) -> Vec<ChannelFailureView> {
    errors.iter().map(ChannelFailure::to_view).collect()
}

fn report(success: bool, message: String, record: Option<&EventRecord>) -> OperationReport {
    OperationReport {
        success,
        message,
        event: record.map(EventRecord::to_response),
        channel_failures: Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
struct ListEventsQuery {
    cycle_id: Option<Uuid>,
}

/// `POST /events`: create an event.
///
/// Responds `201` whenever the record was created. A failed publish or
/// image upload is reported through `success` and `message`.
async fn create_event(
    state: State<AppState>,
    Json(body): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let draft = EventDraft {
        title: body.title,
        description: body.description,
        starts_at: body.starts_at,
        ends_at: body.ends_at,
        cycle_id: body.cycle_id,
        participant_groups: body.participant_groups.map(groups),
        reminder_config: body.reminder_config,
    };

    let outcome = state
        .engine
        .create_event(draft, body.images, body.publish, body.channels)
        .await?;

    let mut response = report(
        outcome.publish_error.is_none() && outcome.image_error.is_none(),
        outcome.message,
        Some(&outcome.record),
    );
    if let Some(publication) = &outcome.publication {
        response.channel_failures = failure_views(&publication.errors);
    }
    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /events`: list events ordered by start time.
async fn list_events(
    state: State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state.engine.store().list_events(query.cycle_id).await?;
    let events: Vec<EventResponse> = records.iter().map(EventRecord::to_response).collect();
    Ok(Json(events))
}

/// `GET /events/{id}`: show one event.
///
/// Publications found only in the fallback message-id cache are included.
async fn get_event(
    state: State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .engine
        .store()
        .get_event(event_id)
        .await?
        .ok_or(ApiError::NotFound("event not found"))?;
    let publications = state.engine.orchestrator().publications(&record).await;

    let mut response = record.to_response();
    response.published = !publications.is_empty();
    response.channel_publications = publications.to_views();
    Ok(Json(response))
}

/// `PATCH /events/{id}`: edit an event.
async fn update_event(
    state: State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(body): Json<UpdateEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let changes = EventChanges {
        title: body.title,
        description: body.description,
        starts_at: body.starts_at,
        ends_at: body.ends_at,
        participant_groups: body.participant_groups.map(groups),
    };
    let options = UpdateOptions {
        publish_now: body.publish_now,
        channels: body.channels,
        reminder_config: body.reminder_config,
        images: body.images,
    };

    let result = state
        .engine
        .orchestrator()
        .update(event_id, changes, options)
        .await?;

    let mut failures = failure_views(&result.errors);
    let mut problems = Vec::new();
    if !result.errors.is_empty() {
        problems.push(format!(
            "failed to update {} channel message(s)",
            result.errors.len()
        ));
    }
    if let Some(publication) = &result.publication {
        failures.extend(failure_views(&publication.errors));
        if !publication.success {
            problems.push("failed to publish".to_string());
        }
    }
    if let Some(e) = &result.image_error {
        problems.push(format!("image upload failed: {e}"));
    }
    if let Some(e) = &result.reminder_error {
        problems.push(format!("reminders not updated: {e}"));
    }

    let message = match (&result.publication, problems.is_empty()) {
        (Some(publication), true) if publication.success => "updated and published".to_string(),
        (_, true) => "updated".to_string(),
        (_, false) => format!("updated but {}", problems.join("; ")),
    };
    let mut response = report(problems.is_empty(), message, Some(&result.record));
    response.channel_failures = failures;
    Ok(Json(response))
}

/// `DELETE /events/{id}`: delete an event everywhere.
async fn delete_event(
    state: State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.engine.delete_event(event_id).await?;

    let message = if result.errors.is_empty() {
        "deleted".to_string()
    } else {
        format!(
            "deleted but failed to remove {} channel message(s)",
            result.errors.len()
        )
    };
    let mut response = report(result.errors.is_empty(), message, None);
    response.channel_failures = failure_views(&result.errors);
    Ok(Json(response))
}

/// `POST /events/{id}/publish`: publish to the requested channels.
async fn publish_event(
    state: State<AppState>,
    Path(event_id): Path<Uuid>,
    body: Option<Json<PublishRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let result = state
        .engine
        .orchestrator()
        .publish(event_id, body.channels.as_deref(), body.reminder_config)
        .await?;

    let message = match (result.success, result.errors.is_empty()) {
        (true, true) => "published".to_string(),
        (true, false) => format!(
            "published, {} channel(s) failed",
            result.errors.len()
        ),
        (false, _) if result.errors.is_empty() => {
            "failed to publish: no channels configured".to_string()
        }
        (false, _) => "failed to publish".to_string(),
    };
    let mut response = report(result.success, message, Some(&result.record));
    response.channel_failures = failure_views(&result.errors);
    Ok(Json(response))
}

/// `PUT /events/{id}/schedule`: schedule publication at a given time.
async fn schedule_event(
    state: State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(body): Json<ScheduleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .engine
        .queue()
        .schedule(event_id, body.scheduled_time)
        .await?;
    let record = state.engine.store().get_event(event_id).await?;
    Ok(Json(report(true, "scheduled".to_string(), record.as_ref())))
}

/// `DELETE /events/{id}/schedule`: cancel a scheduled publication.
async fn cancel_schedule(
    state: State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state.engine.queue().cancel(event_id).await?;
    let message = if removed {
        "schedule cancelled"
    } else {
        "nothing was scheduled"
    };
    let record = state.engine.store().get_event(event_id).await?;
    Ok(Json(report(true, message.to_string(), record.as_ref())))
}
