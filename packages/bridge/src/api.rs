//! HTTP surface: thin axum handlers over the services.
//!
//! Handlers validate, delegate, and shape status codes; no pipeline logic
//! lives here. Store-path details never leak into producer responses, and
//! decryption failures surface as a generic 500.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use meridian_exclusion::{EngineStatistics, ExclusionCheck, ExclusionEngine, ExclusionRule};

use crate::error::BridgeError;
use crate::metrics::{BridgeMetrics, MetricsSnapshot};
use crate::record_store::RecordStore;
use crate::records::{MessageStatus, SendRequest, SendResponse, StoredMessageRecord, TransformationRecord};
use crate::send_pipeline::SendPipeline;

/// Shared handler state.
pub struct AppState {
    pub pipeline: Arc<SendPipeline>,
    pub records: Arc<RecordStore>,
    pub exclusion: Arc<ExclusionEngine>,
    pub metrics: Arc<BridgeMetrics>,
}

/// Build the full bridge router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/messages", post(send_message))
        .route("/api/messages/health", get(health))
        .route("/api/storage/messages", get(list_messages))
        .route(
            "/api/storage/messages/{id}",
            get(get_message).delete(delete_message),
        )
        .route("/api/storage/messages/{id}/republish", post(republish))
        .route("/api/storage/transformations", get(list_transformations))
        .route("/api/storage/transformations/{id}", get(get_transformation))
        .route("/api/storage/status", get(storage_status))
        .route("/api/exclusions/rules", get(list_rules).post(add_rule))
        .route(
            "/api/exclusions/rules/{id}",
            get(get_rule).post(update_rule).delete(remove_rule),
        )
        .route("/api/exclusions/ids", get(list_global_ids))
        .route(
            "/api/exclusions/ids/{id}",
            post(add_global_id).delete(remove_global_id),
        )
        .route("/api/exclusions/test", post(test_exclusion))
        .route("/api/exclusions/stats", get(exclusion_stats))
        .route("/api/metrics", get(metrics_snapshot))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error envelope returned on every non-2xx response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct ApiError(BridgeError);

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            BridgeError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            BridgeError::NotFound(_) => (StatusCode::NOT_FOUND, "record not found".to_string()),
            // Tamper and key-service details stay out of responses
            BridgeError::Crypto(_) => {
                tracing::error!(error = %self.0, "Record retrieval failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to read stored record".to_string(),
                )
            }
            other => {
                tracing::error!(error = %other, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendQuery {
    message_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "UP" })
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SendQuery>,
    Json(request): Json<SendRequest>,
) -> Result<(StatusCode, Json<SendResponse>), ApiError> {
    let response = state
        .pipeline
        .send(request, query.message_type.as_deref())
        .await?;
    let code = match response.status {
        MessageStatus::Excluded => StatusCode::ACCEPTED,
        MessageStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    Ok((code, Json(response)))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<StoredMessageRecord>>, ApiError> {
    let limit = query.limit.unwrap_or(100).min(1_000);
    Ok(Json(state.records.list_messages(limit).await?))
}

async fn get_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<StoredMessageRecord>, ApiError> {
    Ok(Json(state.records.fetch_message(id).await?))
}

async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.records.delete_message(id).await?;
    Ok(StatusCode::OK)
}

async fn republish(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SendResponse>, ApiError> {
    Ok(Json(state.pipeline.republish(id).await?))
}

async fn list_transformations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<TransformationRecord>>, ApiError> {
    let limit = query.limit.unwrap_or(100).min(1_000);
    Ok(Json(state.records.list_transformations(limit).await?))
}

async fn get_transformation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransformationRecord>, ApiError> {
    Ok(Json(state.records.fetch_transformation(id).await?))
}

async fn storage_status(State(state): State<Arc<AppState>>) -> String {
    format!(
        "Message storage enabled (container: {}, encryption: {})",
        state.records.container(),
        if state.records.encryption_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    )
}

// ========== Exclusion management ==========

async fn list_rules(State(state): State<Arc<AppState>>) -> Json<Vec<ExclusionRule>> {
    Json(state.exclusion.list_rules())
}

async fn add_rule(
    State(state): State<Arc<AppState>>,
    Json(rule): Json<ExclusionRule>,
) -> Result<Json<ExclusionRule>, ApiError> {
    if rule.name.trim().is_empty() {
        return Err(BridgeError::Validation("rule name must not be empty".into()).into());
    }
    let rule_id = state.exclusion.add_rule(rule);
    state
        .exclusion
        .get_rule(rule_id)
        .map(Json)
        .ok_or_else(|| BridgeError::NotFound(rule_id.to_string()).into())
}

async fn get_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExclusionRule>, ApiError> {
    state
        .exclusion
        .get_rule(id)
        .map(Json)
        .ok_or_else(|| BridgeError::NotFound(id.to_string()).into())
}

async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(rule): Json<ExclusionRule>,
) -> Result<Json<ExclusionRule>, ApiError> {
    if !state.exclusion.update_rule(id, rule) {
        return Err(BridgeError::NotFound(id.to_string()).into());
    }
    state
        .exclusion
        .get_rule(id)
        .map(Json)
        .ok_or_else(|| BridgeError::NotFound(id.to_string()).into())
}

async fn remove_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.exclusion.remove_rule(id) {
        Ok(StatusCode::OK)
    } else {
        Err(BridgeError::NotFound(id.to_string()).into())
    }
}

async fn list_global_ids(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.exclusion.list_global_ids())
}

#[derive(Debug, Serialize)]
struct GlobalIdAck {
    id: String,
}

async fn add_global_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<GlobalIdAck> {
    state.exclusion.add_global_id(id.clone());
    Json(GlobalIdAck { id })
}

async fn remove_global_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.exclusion.remove_global_id(&id) {
        Ok(StatusCode::OK)
    } else {
        Err(BridgeError::NotFound(id).into())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestExclusionRequest {
    content: String,
    message_type: Option<String>,
}

async fn test_exclusion(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TestExclusionRequest>,
) -> Result<Json<ExclusionCheck>, ApiError> {
    if request.content.is_empty() {
        return Err(BridgeError::Validation("content must not be empty".into()).into());
    }
    Ok(Json(state.exclusion.test_against(
        &request.content,
        request.message_type.as_deref(),
    )))
}

async fn exclusion_stats(State(state): State<Arc<AppState>>) -> Json<EngineStatistics> {
    Json(state.exclusion.statistics())
}

async fn metrics_snapshot(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
