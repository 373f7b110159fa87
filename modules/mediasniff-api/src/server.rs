//! HTTP surface for the core: one message endpoint plus a health check.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;

use crate::router::CoreService;

pub fn app(service: Arc<CoreService>) -> Router {
    Router::new()
        .route("/api/message", post(message))
        .route("/healthz", get(healthz))
        .with_state(service)
}

async fn message(
    State(service): State<Arc<CoreService>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    Json(service.handle(body).await)
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use mediasniff_common::{EventBus, SnifferConfig};
    use mediasniff_graph::MemoryStore;
    use mediasniff_net::{default_registry, DownloadScheduler, ResumableStore, SpeedEstimator};
    use tower::ServiceExt;

    fn service() -> Arc<CoreService> {
        let store: Arc<dyn mediasniff_graph::KeyValueStore> = Arc::new(MemoryStore::new());
        let estimator = Arc::new(std::sync::Mutex::new(SpeedEstimator::new()));
        let events = EventBus::default();
        let registry = Arc::new(default_registry());
        let scheduler = DownloadScheduler::new(
            Arc::clone(&registry),
            Arc::clone(&estimator),
            Arc::new(ResumableStore::new(Arc::clone(&store))),
            Arc::clone(&store),
            events.clone(),
            SnifferConfig::default(),
        );
        Arc::new(CoreService::new(
            registry,
            scheduler,
            estimator,
            store,
            events,
            SnifferConfig::default(),
            2,
        ))
    }

    #[tokio::test]
    async fn healthz_responds() {
        let app = app(service());
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn message_endpoint_wraps_envelope() {
        let app = app(service());
        let request = Request::post("/api/message")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"action":"GET_DOWNLOAD_QUEUE"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["success"], true);
        assert!(value["items"].is_array());
    }

    #[tokio::test]
    async fn unknown_action_reported_in_envelope() {
        let app = app(service());
        let request = Request::post("/api/message")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"action":"OPEN_POD_BAY_DOORS"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "unknown action");
    }
}
