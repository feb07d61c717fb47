//! HTTP API: query answering, health and publishing

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::warn;

use ragline_core::{Error, ErrorKind, IncomingTextMessage, StreamCoordinates};
use ragline_kafka::TextPublisher;
use ragline_pipeline::{IngestionState, RetrievalPipeline};

#[derive(Clone)]
pub struct AppState {
    pub retrieval: Arc<RetrievalPipeline>,
    pub ingestion: Option<watch::Receiver<IngestionState>>,
    pub publisher: Option<Arc<TextPublisher>>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    query: String,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    text: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct HealthBody {
    status: &'static str,
    ingestion: Option<IngestionState>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    message: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/search", get(search_handler))
        .route("/api/health", get(health_handler))
        .route("/api/kafka", post(publish_handler))
        .with_state(state)
}

fn status_for(err: &Error) -> StatusCode {
    match err.kind() {
        ErrorKind::InvalidArgument => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        ErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Parse | ErrorKind::Integrity | ErrorKind::Configuration => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn api_error(err: Error) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        warn!(status = status.as_u16(), error = %err, "request failed");
    }
    (
        status,
        Json(ErrorBody {
            message: err.to_string(),
        }),
    )
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<String>, ApiError> {
    let answer = state
        .retrieval
        .answer(&params.query)
        .await
        .map_err(api_error)?;
    Ok(Json(answer))
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        ingestion: state.ingestion.as_ref().map(|rx| *rx.borrow()),
    })
}

pub async fn publish_handler(
    State(state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<StreamCoordinates>, ApiError> {
    let publisher = state.publisher.as_ref().ok_or_else(|| {
        api_error(Error::ServiceUnavailable(
            "publishing is not configured".to_string(),
        ))
    })?;
    let message =
        IncomingTextMessage::new(request.text, request.timestamp.unwrap_or_else(Utc::now));
    let coordinates = publisher.publish(&message).await.map_err(api_error)?;
    Ok(Json(coordinates))
}
