//! handlers.rs — HTTP surface of the fleet
//!
//! Reads take the registry's read lock and clone what they return. Commands,
//! electrical overrides and audits take the write lock, so they serialize
//! against the tick loop.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use fleet_simulator::{
    audit_consistency, execute, sensor_statistics, system_status, Command, ConcentratorDetails,
    ConsistencyReport, ElectricalUpdate, FleetError, Relay, SensorStatistics, SystemStatus,
};
use lighting_types::{CommandRequest, ConcentratorSummary, PageRequest, RelaySummary};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::state::{
    parse_path_id, ApiError, AppState, CommandResponse, DataResponse, PagedResponse,
};

// ─── Router ──────────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/stats/sensors", get(sensor_stats))
        .route("/maintenance/consistency", post(consistency_audit))
        .route("/concentrators", get(list_concentrators))
        .route("/get_concentrators", get(list_concentrators))
        .route("/concentrators/:cid/details", get(concentrator_details))
        .route("/get_concentrator_details/:id", get(concentrator_details))
        .route("/concentrators/:cid/relays", get(list_relays))
        .route("/get_relays/:id", get(list_relays))
        .route("/concentrators/:cid/relays/:rid/details", get(relay_details))
        .route("/get_relay_details/:cid/:rid", get(relay_details))
        .route("/concentrators/:cid/relays/:rid/electrical", patch(update_electrical))
        .route("/commands", post(execute_command))
        .route("/execute_command", post(execute_command))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Raw pagination query. Kept as strings so garbage falls back to defaults
/// instead of failing extraction.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub offset: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    fn request(&self) -> PageRequest {
        PageRequest::parse(self.offset.as_deref(), self.limit.as_deref())
    }
}

// ─── Service ─────────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptimeSecs": state.started.elapsed().as_secs(),
    }))
}

async fn status(State(state): State<AppState>) -> Json<DataResponse<SystemStatus>> {
    let registry = state.registry.read().await;
    DataResponse::ok(system_status(&registry))
}

async fn sensor_stats(State(state): State<AppState>) -> Json<DataResponse<SensorStatistics>> {
    let registry = state.registry.read().await;
    DataResponse::ok(sensor_statistics(&registry))
}

async fn consistency_audit(State(state): State<AppState>) -> Json<DataResponse<ConsistencyReport>> {
    let ctx = state.context();
    let mut registry = state.registry.write().await;
    DataResponse::ok(audit_consistency(&mut registry, ctx.is_night))
}

// ─── Concentrators ───────────────────────────────────────────────────────────

async fn list_concentrators(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Json<PagedResponse<ConcentratorSummary>> {
    let started = Instant::now();
    let page = state.registry.read().await.concentrator_page(query.request());
    Json(PagedResponse::new(page, started))
}

async fn concentrator_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<ConcentratorDetails>>, ApiError> {
    let id = parse_path_id("concentrator id", &id)?;
    let registry = state.registry.read().await;
    let concentrator = registry
        .concentrator(id)
        .ok_or(FleetError::ConcentratorNotFound(id))?;
    Ok(DataResponse::ok(concentrator.details().clone()))
}

// ─── Relays ──────────────────────────────────────────────────────────────────

async fn list_relays(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResponse<RelaySummary>>, ApiError> {
    let started = Instant::now();
    let id = parse_path_id("concentrator id", &id)?;
    let page = state
        .registry
        .read()
        .await
        .relay_page(id, query.request())
        .ok_or(FleetError::ConcentratorNotFound(id))?;
    Ok(Json(PagedResponse::new(page, started)))
}

async fn relay_details(
    State(state): State<AppState>,
    Path((cid, rid)): Path<(String, String)>,
) -> Result<Json<DataResponse<Relay>>, ApiError> {
    let concentrator_id = parse_path_id("concentrator id", &cid)?;
    let relay_id = parse_path_id("relay id", &rid)?;
    let registry = state.registry.read().await;
    if registry.concentrator(concentrator_id).is_none() {
        return Err(FleetError::ConcentratorNotFound(concentrator_id).into());
    }
    let relay = registry
        .relay(concentrator_id, relay_id)
        .ok_or(FleetError::RelayNotFound { concentrator_id, relay_id })?;
    Ok(DataResponse::ok(relay.clone()))
}

async fn update_electrical(
    State(state): State<AppState>,
    Path((cid, rid)): Path<(String, String)>,
    Json(update): Json<ElectricalUpdate>,
) -> Result<Json<DataResponse<Relay>>, ApiError> {
    let concentrator_id = parse_path_id("concentrator id", &cid)?;
    let relay_id = parse_path_id("relay id", &rid)?;
    let ctx = state.context();
    let mut registry = state.registry.write().await;
    let relay = registry.update_electrical(concentrator_id, relay_id, &update, &ctx)?;
    info!("🔌 Electrical override on relay {relay_id}@{concentrator_id}: {update:?}");
    Ok(DataResponse::ok(relay.clone()))
}

// ─── Commands ────────────────────────────────────────────────────────────────

fn required_id(field: &'static str, value: Option<&Value>) -> Result<u32, ApiError> {
    let value = value.ok_or_else(|| ApiError::BadRequest(format!("missing `{field}`")))?;
    lighting_types::parse_id(value).ok_or_else(|| ApiError::BadId { what: field, raw: value.to_string() })
}

async fn execute_command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let name = req
        .command
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing `command`".into()))?;
    let concentrator_id = required_id("concentratorId", req.concentrator_id.as_ref())?;
    let relay_id = required_id("relayId", req.relay_id.as_ref())?;
    let command = Command::decode(name, req.parameters.as_ref())?;

    let ctx = state.context();
    let effect = {
        let mut registry = state.registry.write().await;
        execute(&mut registry, concentrator_id, relay_id, &command, &ctx)?
    };
    info!("💡 {command} on relay {relay_id}@{concentrator_id}: {effect}");

    Ok(Json(CommandResponse {
        success: true,
        message: format!(
            "Command '{name}' executed on relay {relay_id} of concentrator {concentrator_id}. {effect}"
        ),
        command: command.name().to_string(),
        concentrator_id,
        relay_id,
        command_id: Uuid::new_v4(),
        timestamp: ctx.now,
    }))
}
