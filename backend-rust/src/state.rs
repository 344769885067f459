use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, FixedOffset};
use fleet_simulator::{DeviceRegistry, FleetError, LocalClock, SimContext};
use lighting_types::{ConcentratorId, Page, RelayId};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

// ─── Shared State ────────────────────────────────────────────────────────────

/// The one fleet of the process. Ticks and commands take the write lock.
pub type SharedRegistry = Arc<RwLock<DeviceRegistry>>;

#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
    pub clock: LocalClock,
    pub started: Instant,
}

impl AppState {
    pub fn new(registry: SharedRegistry, clock: LocalClock) -> Self {
        Self { registry, clock, started: Instant::now() }
    }

    /// Context for an on-demand operation (no simulated time passes).
    pub fn context(&self) -> SimContext {
        self.clock.context(Duration::ZERO)
    }
}

// ─── Response Envelopes ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResponse<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub success: bool,
    pub elapsed_time: String,
    pub returned: usize,
}

impl<T> PagedResponse<T> {
    pub fn new(page: Page<T>, started: Instant) -> Self {
        Self {
            returned: page.items.len(),
            data: page.items,
            total: page.total,
            offset: page.offset,
            limit: page.limit,
            success: true,
            elapsed_time: format!("{}ms", started.elapsed().as_millis()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self { success: true, data })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    pub message: String,
    pub command: String,
    pub concentrator_id: ConcentratorId,
    pub relay_id: RelayId,
    pub command_id: Uuid,
    pub timestamp: DateTime<FixedOffset>,
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Fleet(#[from] FleetError),
    #[error("invalid {what} '{raw}'")]
    BadId { what: &'static str, raw: String },
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Fleet(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Self::Fleet(FleetError::CapabilityViolation { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Fleet(_) | Self::BadId { .. } | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody { success: false, error: self.to_string() });
        (self.status(), body).into_response()
    }
}

/// Parse a path segment as a device id.
pub fn parse_path_id(what: &'static str, raw: &str) -> Result<u32, ApiError> {
    raw.trim().parse().map_err(|_| ApiError::BadId { what, raw: raw.to_string() })
}
