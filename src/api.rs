use anyhow::Result;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handler::{SubmissionHandler, SubmissionRequest, SubmissionResponse, SubmitError};

pub struct AppState {
    pub handler: Arc<SubmissionHandler>,
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/data", post(submit))
        .with_state(state)
}

pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes(state))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(bind_addr: &str, state: Arc<AppState>) -> Result<()> {
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Contact API listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Ctrl+C received, shutting down.");
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn submit(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmissionRequest>,
) -> Result<Json<SubmissionResponse>, SubmitError> {
    let resp = state.handler.handle(body.contacto).await?;
    Ok(Json(resp))
}

impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        let status = match &self {
            SubmitError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let mut body = json!({
            "type": "about:blank",
            "title": "An error occurred while processing your request.",
            "status": status.as_u16(),
            "detail": format!("Error: {self}"),
            "stage": self.stage(),
            "persisted": self.persisted(),
        });
        if let SubmitError::Email { uuid, .. } | SubmitError::Sms { uuid, .. } = &self {
            body["uuid"] = json!(uuid);
        }

        (
            status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            body.to_string(),
        )
            .into_response()
    }
}
