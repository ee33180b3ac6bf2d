//! Axum server setup and router configuration.

use crate::api;
use crate::shutdown::shutdown_signal;
use crate::state::AppState;
use axum::{Json, Router, response::IntoResponse, routing::get};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the main application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(api::events::router())
        .merge(api::cycles::router())
        .merge(api::attendance::router())
        .merge(api::push::router())
        .merge(api::changes::router())
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Simple health check - returns OK if the server is running.
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Run the server with graceful shutdown support.
pub async fn run_server(router: Router, addr: SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use herald_core::Engine;
    use herald_core::channels::{ChannelAdapter, ChannelError, ChannelRegistry};
    use herald_core::config::ConfigStore;
    use herald_core::events::rsvp_update_channel;
    use herald_core::store::MemoryStore;
    use herald_sdk::objects::{
        AttendanceRecord, ChannelId, CycleResponse, EventMessage, EventResponse, OperationReport,
        RsvpUpdateNotification,
    };
    use herald_sdk::signature::{SIGNATURE_HEADER, SignedObject};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    const PUSH_SECRET: &[u8] = b"push-secret";

    struct CountingChannel {
        id: ChannelId,
        created: AtomicUsize,
    }

    #[async_trait]
    impl ChannelAdapter for CountingChannel {
        fn id(&self) -> &ChannelId {
            &self.id
        }

        fn name(&self) -> &str {
            "Counting"
        }

        async fn create_message(&self, message: &EventMessage) -> Result<String, ChannelError> {
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{}-{n}", message.event_id))
        }

        async fn update_message(
            &self,
            _message_id: &str,
            _message: &EventMessage,
        ) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn delete_message(&self, _message_id: &str) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn fetch_attendance(
            &self,
            _message_id: &str,
        ) -> Result<Vec<AttendanceRecord>, ChannelError> {
            Ok(Vec::new())
        }
    }

    fn test_state() -> (AppState, herald_core::events::RsvpUpdateReceiver) {
        let channel: Arc<dyn ChannelAdapter> = Arc::new(CountingChannel {
            id: ChannelId::from("forum"),
            created: AtomicUsize::new(0),
        });
        let engine = Engine::builder(
            Arc::new(MemoryStore::new()),
            ConfigStore::new(ChannelRegistry::new(vec![channel])),
        )
        .build();
        let (rsvp_tx, rsvp_rx) = rsvp_update_channel();
        let state = AppState::new(
            Arc::new(engine),
            Some(PUSH_SECRET.to_vec().into_boxed_slice()),
            rsvp_tx,
        );
        (state, rsvp_rx)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let (state, _rx) = test_state();
        let response = build_router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_and_publish_event() {
        let (state, _rx) = test_state();
        let router = build_router(state);

        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/events",
                serde_json::json!({
                    "title": "Raid night",
                    "starts_at": "2030-05-01T19:00:00Z",
                    "ends_at": "2030-05-01T22:00:00Z",
                    "publish": { "mode": "now" }
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let report: OperationReport = read_json(response).await;
        assert!(report.success);
        assert_eq!(report.message, "created and published");
        let event = report.event.unwrap();
        assert!(event.published);
        assert_eq!(event.channel_publications.len(), 1);

        let response = router
            .oneshot(
                Request::get(format!("/events/{}", event.event_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let fetched: EventResponse = read_json(response).await;
        assert_eq!(fetched.title, "Raid night");
    }

    #[tokio::test]
    async fn invalid_event_is_rejected_before_creation() {
        let (state, _rx) = test_state();
        let router = build_router(state);

        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/events",
                serde_json::json!({
                    "title": "Backwards",
                    "starts_at": "2030-05-01T22:00:00Z",
                    "ends_at": "2030-05-01T19:00:00Z"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = router
            .oneshot(Request::get("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let events: Vec<EventResponse> = read_json(response).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn scheduling_a_published_event_conflicts() {
        let (state, _rx) = test_state();
        let router = build_router(state);

        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/events",
                serde_json::json!({
                    "title": "Already out",
                    "starts_at": "2030-05-01T19:00:00Z",
                    "ends_at": "2030-05-01T22:00:00Z",
                    "publish": { "mode": "now" }
                }),
            ))
            .await
            .unwrap();
        let report: OperationReport = read_json(response).await;
        let event_id = report.event.unwrap().event_id;

        let response = router
            .oneshot(json_request(
                "PUT",
                &format!("/events/{event_id}/schedule"),
                serde_json::json!({ "scheduled_time": "2030-04-30T12:00:00Z" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn cycles_report_derived_status() {
        let (state, _rx) = test_state();
        let router = build_router(state);

        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/cycles",
                serde_json::json!({
                    "name": "Season 1",
                    "starts_at": "2000-01-01T00:00:00Z",
                    "ends_at": "2000-03-01T00:00:00Z",
                    "default_participant_groups": ["core"]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = router
            .oneshot(Request::get("/cycles").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let cycles: Vec<CycleResponse> = read_json(response).await;
        assert_eq!(cycles.len(), 1);
        assert_eq!(
            cycles[0].status,
            herald_sdk::objects::CycleStatus::Completed
        );
    }

    #[tokio::test]
    async fn signed_push_is_forwarded_to_the_reconciler() {
        let (state, mut rsvp_rx) = test_state();
        let router = build_router(state);

        let notification = RsvpUpdateNotification {
            source_message_id: "msg-1".to_string(),
            snapshot: Vec::new(),
            timestamp: time::OffsetDateTime::now_utc(),
        };
        let signed = SignedObject::new(notification.clone(), PUSH_SECRET).unwrap();

        let response = router
            .clone()
            .oneshot(
                Request::post("/push/rsvp")
                    .header("Content-Type", "application/json")
                    .header(SIGNATURE_HEADER, signed.to_header())
                    .body(Body::from(signed.json.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(rsvp_rx.recv().await.unwrap(), notification);

        let forged = SignedObject::new(notification, b"wrong-secret").unwrap();
        let response = router
            .oneshot(
                Request::post("/push/rsvp")
                    .header(SIGNATURE_HEADER, forged.to_header())
                    .body(Body::from(forged.json.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
