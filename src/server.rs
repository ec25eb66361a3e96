//! HTTP server exposing the batch dispatcher.
//!
//! Routes:
//! - `POST /api/questions`: answer a batch of questions concurrently
//! - `GET /health`: liveness and model info

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::protocol::{ErrorBody, HealthResponse, QuestionsRequest, QuestionsResponse};
use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Errors surfaced to HTTP callers.
///
/// Per-question failures are not errors here: they travel inside a 200
/// response. Only an unusable request body is rejected.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        let message = self.to_string();
        warn!(status = %status, error = %message, "Rejected request");

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }
}

/// Build the router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/questions", post(questions_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Answer a batch of questions.
///
/// The batch is cancelled if the client goes away: dropping this future drops
/// the guard, which cancels every question still in flight.
async fn questions_handler(
    State(state): State<AppState>,
    payload: Result<Json<QuestionsRequest>, JsonRejection>,
) -> Result<Json<QuestionsResponse>, ServerError> {
    let Json(request) = payload?;
    info!(count = request.questions.len(), "Received question batch");

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let outcomes = state.dispatcher.dispatch(&cancel, &request.questions).await;
    Ok(Json(QuestionsResponse::from_outcomes(&outcomes)))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.dispatcher.completer().model().to_string(),
    })
}

/// The HTTP server.
pub struct HttpServer {
    config: ServerConfig,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: ServerConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            state: AppState::new(dispatcher),
        }
    }

    /// Bind and serve until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        info!("Listening on {}", listener.local_addr()?);

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error")?;

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompletionError;
    use crate::llm::mock::MockCompleter;
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn state(mock: Arc<MockCompleter>) -> AppState {
        AppState::new(Dispatcher::new(mock, "Q: {question}".to_string(), 128))
    }

    async fn post_json(app: Router, body: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/questions")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_batch_answers_in_order_with_partial_failure() {
        let mock = Arc::new(MockCompleter::new(|prompt| {
            let result = if prompt.contains("color") {
                Err(CompletionError::Transport("mock error".to_string()))
            } else {
                Ok(prompt.to_uppercase())
            };
            (Duration::ZERO, result)
        }));
        let app = router(state(mock));

        let (status, body) = post_json(
            app,
            r#"{"questions": ["What is 2+2?", "Name a primary color", "why"]}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "responses": [
                    { "answer": "Q: WHAT IS 2+2?" },
                    { "error": "transport error: mock error" },
                    { "answer": "Q: WHY" }
                ]
            })
        );
    }

    #[tokio::test]
    async fn test_empty_batch_returns_empty_responses() {
        let mock = Arc::new(MockCompleter::echo());
        let (status, body) = post_json(router(state(mock.clone())), r#"{"questions": []}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "responses": [] }));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let mock = Arc::new(MockCompleter::echo());
        let (status, body) = post_json(router(state(mock.clone())), r#"{"questions": "#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_wrong_shape_is_bad_request() {
        let mock = Arc::new(MockCompleter::echo());
        let (status, _) = post_json(router(state(mock.clone())), r#"{"questions": [1, 2]}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_content_type_is_bad_request() {
        let app = router(state(Arc::new(MockCompleter::echo())));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/questions")
                    .body(Body::from(r#"{"questions": ["a"]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_reports_model() {
        let app = router(state(Arc::new(MockCompleter::echo())));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.model, "mock-model");
        assert!(!health.version.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_request_cancels_in_flight_questions() {
        let mock = Arc::new(MockCompleter::new(|_| {
            (Duration::from_secs(3600), Ok("late".to_string()))
        }));
        let state = state(mock.clone());
        let request = QuestionsRequest {
            questions: vec!["a".to_string(), "b".to_string()],
        };

        let handler = questions_handler(State(state), Ok(Json(request)));
        let timed_out = tokio::time::timeout(Duration::from_millis(100), handler).await;
        assert!(timed_out.is_err());

        // Give the spawned tasks a chance to observe the cancellation.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(mock.calls(), 2);
        assert_eq!(mock.in_flight(), 0);
    }
}
