use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use beach_negotiate::{Mailbox, MailboxError, MailboxSnapshot, SignalRequest, SignalResponse};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub type SharedMailbox = Arc<Mailbox>;

pub fn router(mailbox: SharedMailbox) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/signal", post(signal))
        .with_state(mailbox)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    status: &'static str,
    #[serde(flatten)]
    slots: MailboxSnapshot,
}

pub async fn health_check(State(mailbox): State<SharedMailbox>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        slots: mailbox.snapshot(),
    })
}

pub async fn signal(
    State(mailbox): State<SharedMailbox>,
    Json(request): Json<SignalRequest>,
) -> Result<Json<SignalResponse>, SignalError> {
    Ok(Json(mailbox.handle(request)?))
}

#[derive(Debug)]
pub struct SignalError(MailboxError);

impl From<MailboxError> for SignalError {
    fn from(err: MailboxError) -> Self {
        Self(err)
    }
}

impl IntoResponse for SignalError {
    fn into_response(self) -> Response {
        warn!(error = %self.0, "rejected signal push");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}
