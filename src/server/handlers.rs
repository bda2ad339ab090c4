use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::metrics::PipelineMetricsSnapshot;
use crate::pipeline::{Lifecycle, ScoreSnapshot};
use crate::server::state::AppState;

/// Acknowledgement for a submitted prediction request
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub status: String,
    pub datetime: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PipelineStatus {
    pub lifecycle: Lifecycle,
    pub metrics: PipelineMetricsSnapshot,
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Submit a prediction request and return immediately
pub async fn predict(State(state): State<AppState>) -> impl IntoResponse {
    state.orchestrator.enqueue(state.new_request());
    Json(PredictResponse {
        status: "enqueued".to_string(),
        datetime: Utc::now(),
    })
}

/// Last published score and its completion time
pub async fn score(State(state): State<AppState>) -> Json<ScoreSnapshot> {
    Json(state.scores().snapshot())
}

/// Pipeline lifecycle and counters
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(PipelineStatus {
        lifecycle: state.orchestrator.lifecycle(),
        metrics: state.orchestrator.metrics(),
    })
}

/// Create the Axum router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/predict", get(predict))
        .route("/score", get(score))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::pipeline::Orchestrator;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    fn create_test_app() -> (Router, Arc<Orchestrator>) {
        let orchestrator = Arc::new(Orchestrator::from_config(&ServiceConfig::default()).unwrap());
        let state = AppState::new(Arc::clone(&orchestrator), "predictions.csv");
        (create_router(state), orchestrator)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, _) = create_test_app();

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_score_endpoint_before_any_prediction() {
        let (app, _) = create_test_app();
        let (status, body) = get_json(app, "/score").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"score": 0.0, "last_dt": null}));
    }

    #[tokio::test]
    async fn test_predict_endpoint_enqueues() {
        let (app, orchestrator) = create_test_app();
        let (status, body) = get_json(app, "/predict").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "enqueued");
        assert!(body["datetime"].as_str().unwrap().parse::<DateTime<Utc>>().is_ok());
        assert_eq!(orchestrator.metrics().enqueued, 1);
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let (app, _) = create_test_app();
        let (status, body) = get_json(app, "/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lifecycle"], "idle");
        assert_eq!(body["metrics"]["enqueued"], 0);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let (app, _) = create_test_app();

        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
