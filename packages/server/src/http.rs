//! HTTP surface.
//!
//! Thin request layer over the coordinator: the pipeline is externally
//! triggered, so these handlers only parse, delegate, and map error kinds
//! to status codes. Vetoed responses are successful responses.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use epochmesh_bus::channels;
use epochmesh_core::{CoreError, GameEvent};

use crate::commands::{BatchItemResult, BatchOutcome, CommandAccepted, CommandRequest, MAX_BATCH};
use crate::state::AppState;

/// Error envelope returned to HTTP callers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "INVALID_INPUT",
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: "NOT_FOUND",
            message: message.into(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CoreError::CircuitAllOpen => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CoreError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            CoreError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "kind": self.kind,
            "timestamp": Utc::now().to_rfc3339(),
        }));
        (self.status, body).into_response()
    }
}

/// Full application router, bus transport included.
pub fn router(state: AppState) -> Router {
    let bus = state.bus.clone();
    Router::new()
        .route("/api/events", post(post_event))
        .route("/api/events/batch", post(post_event_batch))
        .route("/api/v1/npc/command", post(post_command))
        .route("/api/v1/npc/command/batch", post(post_command_batch))
        .route("/api/v1/npc/spawn-manifest", get(get_spawn_manifest))
        .route("/health", get(get_health))
        .route("/health/deep", get(get_health_deep))
        .route("/api/audit", get(get_audit))
        .route("/api/audit/stats", get(get_audit_stats))
        .with_state(state)
        .merge(epochmesh_bus::router(bus))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

fn parse_event(value: Value) -> Result<GameEvent, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::bad_request(format!("invalid event: {e}")))
}

async fn post_event(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let event = parse_event(body)?;
    let response = state.coordinator.process_event(event).await?;
    Ok(Json(serde_json::to_value(response).unwrap_or_default()))
}

async fn post_event_batch(
    State(state): State<AppState>,
    Json(body): Json<Vec<Value>>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let events = body
        .into_iter()
        .map(parse_event)
        .collect::<Result<Vec<_>, _>>()?;
    let results = state.coordinator.process_batch(events).await;
    let payload = results
        .into_iter()
        .map(|result| match result {
            Ok(response) => serde_json::to_value(response).unwrap_or_default(),
            Err(err) => json!({"error": err.to_string(), "kind": err.kind()}),
        })
        .collect();
    Ok(Json(payload))
}

fn accept_command(state: &AppState, request: &CommandRequest) -> Result<CommandAccepted, ApiError> {
    request.validate().map_err(ApiError::bad_request)?;
    let npc = state
        .catalog
        .get(&request.npc_id)
        .ok_or_else(|| ApiError::not_found(format!("unknown NPC {}", request.npc_id)))?;

    // Echo for exporters; delivery is the bus's problem.
    state.bus.publish(
        channels::NPC_COMMANDS,
        json!({
            "commandId": request.command_id,
            "npcId": request.npc_id,
            "npcName": npc.name,
            "commandType": request.command_type,
            "payload": request.payload,
            "priority": request.priority,
        }),
    );

    Ok(CommandAccepted {
        accepted: true,
        command_id: request.command_id.clone(),
        command_type: request.command_type,
        npc_name: npc.name.clone(),
    })
}

async fn post_command(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<CommandAccepted>, ApiError> {
    let request: CommandRequest = serde_json::from_value(body)
        .map_err(|e| ApiError::bad_request(format!("invalid command: {e}")))?;
    let accepted = accept_command(&state, &request)?;
    Ok(Json(accepted))
}

async fn post_command_batch(
    State(state): State<AppState>,
    Json(body): Json<Vec<Value>>,
) -> Result<Json<BatchOutcome>, ApiError> {
    if body.len() > MAX_BATCH {
        return Err(ApiError::bad_request(format!(
            "batch of {} exceeds limit {MAX_BATCH}",
            body.len()
        )));
    }
    let mut results = Vec::with_capacity(body.len());
    let mut accepted = 0usize;
    for item in body {
        let command_id = item
            .get("commandId")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let outcome = serde_json::from_value::<CommandRequest>(item)
            .map_err(|e| format!("invalid command: {e}"))
            .and_then(|request| {
                accept_command(&state, &request).map_err(|err| err.message.clone())
            });
        match outcome {
            Ok(result) => {
                accepted += 1;
                results.push(BatchItemResult::Accepted {
                    command_id: result.command_id,
                    accepted: true,
                });
            }
            Err(error) => results.push(BatchItemResult::Rejected { command_id, error }),
        }
    }
    let total = results.len();
    Ok(Json(BatchOutcome {
        total,
        accepted,
        rejected: total - accepted,
        results,
    }))
}

async fn get_spawn_manifest(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::to_value(state.catalog.spawn_manifest()).unwrap_or_default())
}

async fn get_health() -> Json<Value> {
    Json(json!({"status": "ok", "timestamp": Utc::now().to_rfc3339()}))
}

async fn get_health_deep(State(state): State<AppState>) -> Response {
    let health = state.health.deep_health().await;
    let status = if health.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(serde_json::to_value(health).unwrap_or_default())).into_response()
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    count: Option<usize>,
}

async fn get_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Json<Value> {
    let count = query.count.unwrap_or(50);
    Json(serde_json::to_value(state.audit.recent(count)).unwrap_or_default())
}

async fn get_audit_stats(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::to_value(state.audit.stats()).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_expected_statuses() {
        let cases = [
            (CoreError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::CircuitAllOpen, StatusCode::SERVICE_UNAVAILABLE),
            (CoreError::Timeout(5_000), StatusCode::GATEWAY_TIMEOUT),
            (CoreError::RateLimited("x".into()), StatusCode::TOO_MANY_REQUESTS),
            (
                CoreError::UpstreamUnavailable("x".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (CoreError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status, expected);
        }
    }

    #[test]
    fn not_found_is_404() {
        let err = ApiError::not_found("unknown NPC");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
