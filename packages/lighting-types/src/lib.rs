//! # lighting-types
//!
//! Shared wire structures for the street-lighting fleet simulator.
//!
//! These types are used by:
//! - `fleet-simulator`: building the in-memory fleet from a topology and
//!   rendering list views of it
//! - `backend-rust`: decoding HTTP requests and encoding responses
//!
//! ## Status codes
//!
//! Both device kinds report a 4-character status code (`"0101"`, `"0110"`, ...).
//! The codes are opaque tags from a closed set, not bit flags: exactly one is
//! active per device at any time.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Identifiers ───────────────────────────────────────────────────────────────

/// Concentrator id as assigned by the topology file.
pub type ConcentratorId = u32;

/// Relay id. Unique only within the owning concentrator.
pub type RelayId = u32;

// ── Relay Status ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelayStatus {
    /// Luminaire lit during the day (anomalous, day only)
    #[serde(rename = "0001")]
    OnDuringDay,
    /// Luminaire dark during the night (anomalous, night only)
    #[serde(rename = "0010")]
    OffDuringNight,
    #[serde(rename = "0011")]
    PowerDrop,
    #[serde(rename = "0100")]
    Fault,
    #[serde(rename = "0101")]
    On,
    #[serde(rename = "0110")]
    Off,
    #[serde(rename = "0111")]
    Dimmed,
    #[serde(rename = "1000")]
    NoCommunication,
    /// Registered but no readings collected since installation
    #[serde(rename = "1001")]
    NoReadings,
    /// Mains below 190 V
    #[serde(rename = "1010")]
    LowVoltage,
    /// Mains above 264 V
    #[serde(rename = "1011")]
    HighVoltage,
}

impl RelayStatus {
    pub const ALL: [RelayStatus; 11] = [
        Self::OnDuringDay,
        Self::OffDuringNight,
        Self::PowerDrop,
        Self::Fault,
        Self::On,
        Self::Off,
        Self::Dimmed,
        Self::NoCommunication,
        Self::NoReadings,
        Self::LowVoltage,
        Self::HighVoltage,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::OnDuringDay => "0001",
            Self::OffDuringNight => "0010",
            Self::PowerDrop => "0011",
            Self::Fault => "0100",
            Self::On => "0101",
            Self::Off => "0110",
            Self::Dimmed => "0111",
            Self::NoCommunication => "1000",
            Self::NoReadings => "1001",
            Self::LowVoltage => "1010",
            Self::HighVoltage => "1011",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::OnDuringDay => "luminaire on during the day",
            Self::OffDuringNight => "luminaire off during the night",
            Self::PowerDrop => "luminaire power drop",
            Self::Fault => "luminaire fault",
            Self::On => "luminaire on",
            Self::Off => "luminaire off",
            Self::Dimmed => "luminaire dimmed",
            Self::NoCommunication => "relay without communication",
            Self::NoReadings => "relay without readings since installation",
            Self::LowVoltage => "mains voltage below 190 V",
            Self::HighVoltage => "mains voltage above 264 V",
        }
    }

    /// Plain switching state matching `is_on`.
    pub fn switched(is_on: bool) -> Self {
        if is_on { Self::On } else { Self::Off }
    }
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ── Concentrator Status ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConcentratorStatus {
    #[serde(rename = "0001")]
    Offline30Min,
    #[serde(rename = "0010")]
    Offline60Min,
    /// Online through the cellular modem
    #[serde(rename = "0011")]
    OnlineCellular,
    /// Online through a wired uplink
    #[serde(rename = "0101")]
    OnlineWired,
    #[serde(rename = "0110")]
    Offline,
    /// Registered but never powered up
    #[serde(rename = "0111")]
    NeverConnected,
}

impl ConcentratorStatus {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Offline30Min => "0001",
            Self::Offline60Min => "0010",
            Self::OnlineCellular => "0011",
            Self::OnlineWired => "0101",
            Self::Offline => "0110",
            Self::NeverConnected => "0111",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Offline30Min => "offline for 30+ minutes",
            Self::Offline60Min => "offline for 60+ minutes",
            Self::OnlineCellular => "online via cellular",
            Self::OnlineWired => "online via wired uplink",
            Self::Offline => "offline",
            Self::NeverConnected => "registered but never connected",
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, Self::OnlineCellular | Self::OnlineWired)
    }
}

impl fmt::Display for ConcentratorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ── Topology (input from the offline placement step) ─────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyRelay {
    pub id: RelayId,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConcentrator {
    pub id: ConcentratorId,
    pub point: GeoPoint,
    #[serde(default)]
    pub relays: Vec<TopologyRelay>,
}

/// Static relay-to-concentrator assignment. Immutable for the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    pub concentrators: Vec<TopologyConcentrator>,
}

impl Topology {
    pub fn relay_count(&self) -> usize {
        self.concentrators.iter().map(|c| c.relays.len()).sum()
    }
}

// ── List views ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcentratorSummary {
    pub id: ConcentratorId,
    pub label: String,
    /// Fixed 5-decimal rendering, as field gateways report it
    pub lat: String,
    pub lng: String,
    pub status: ConcentratorStatus,
    pub status_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelaySummary {
    pub id_relay: RelayId,
    pub label: String,
    pub id_concentrator: ConcentratorId,
    pub lat: String,
    pub lng: String,
    pub status: RelayStatus,
    pub status_description: String,
}

pub fn format_coordinate(value: f64) -> String {
    format!("{value:.5}")
}

// ── Pagination ────────────────────────────────────────────────────────────────

pub const DEFAULT_PAGE_LIMIT: usize = 1000;

/// Normalized offset/limit pair. Never fails: bad input falls back to defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { offset: 0, limit: DEFAULT_PAGE_LIMIT }
    }
}

impl PageRequest {
    /// `offset < 0` becomes 0, `limit <= 0` becomes the default limit.
    pub fn new(offset: i64, limit: i64) -> Self {
        let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let limit = if limit <= 0 {
            DEFAULT_PAGE_LIMIT
        } else {
            usize::try_from(limit).unwrap_or(usize::MAX)
        };
        Self { offset, limit }
    }

    /// Parse raw query-string values. Non-numeric input yields the defaults.
    pub fn parse(offset: Option<&str>, limit: Option<&str>) -> Self {
        let offset = offset
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(0);
        let limit = limit
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_PAGE_LIMIT as i64);
        Self::new(offset, limit)
    }

    /// Index range into a collection of `total` items. Empty when out of range.
    pub fn range(&self, total: usize) -> std::ops::Range<usize> {
        let start = self.offset.min(total);
        let end = start.saturating_add(self.limit).min(total);
        start..end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

impl<T> Page<T> {
    /// Cut one page out of `all`. Only the selected items are materialized.
    pub fn slice<I>(all: I, request: PageRequest) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let all = all.into_iter();
        let total = all.len();
        let range = request.range(total);
        let items = all.skip(range.start).take(range.len()).collect();
        Self { items, total, offset: request.offset, limit: request.limit }
    }
}

// ── Commands (wire envelope) ──────────────────────────────────────────────────

/// Command names accepted on the wire. Aliases used by older gateway
/// integrations (`turn_light_on`, ...) are accepted as well.
pub const COMMAND_NAMES: [&str; 10] = [
    "turn_on",
    "turn_off",
    "enable_dimmer",
    "disable_dimmer",
    "program_dimmer_percentage",
    "enable_light_sensor",
    "disable_light_sensor",
    "enable_time_program",
    "disable_time_program",
    "setup_time_program",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub off_time: Option<String>,
}

/// Body of `POST /commands`. Ids may arrive as numbers or numeric strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub concentrator_id: Option<serde_json::Value>,
    #[serde(default)]
    pub relay_id: Option<serde_json::Value>,
    #[serde(default)]
    pub parameters: Option<CommandParameters>,
}

/// Read an id that may be encoded as a JSON number or a numeric string.
pub fn parse_id(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        serde_json::Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_codes_round_trip_through_serde() {
        let encoded = serde_json::to_string(&RelayStatus::Dimmed).unwrap();
        assert_eq!(encoded, "\"0111\"");
        let decoded: ConcentratorStatus = serde_json::from_str("\"0101\"").unwrap();
        assert_eq!(decoded, ConcentratorStatus::OnlineWired);
        assert_eq!(RelayStatus::from_code("1011"), Some(RelayStatus::HighVoltage));
        assert_eq!(RelayStatus::from_code("1111"), None);
    }

    #[test]
    fn page_request_falls_back_to_defaults() {
        assert_eq!(PageRequest::parse(Some("abc"), Some("")), PageRequest::default());
        assert_eq!(PageRequest::new(-5, 0), PageRequest::default());
        assert_eq!(PageRequest::parse(Some(" 20 "), Some("5")), PageRequest { offset: 20, limit: 5 });
        assert_eq!(PageRequest::parse(None, Some("-3")).limit, DEFAULT_PAGE_LIMIT);
    }

    #[test]
    fn page_slice_past_the_end_is_empty_with_total() {
        let page = Page::slice(0..7, PageRequest::new(7, 10));
        assert!(page.items.is_empty());
        assert_eq!(page.total, 7);

        let page = Page::slice(vec![0, 1, 2, 3, 4, 5, 6], PageRequest::new(5, 10));
        assert_eq!(page.items, vec![5, 6]);
    }

    #[test]
    fn ids_parse_from_numbers_and_strings() {
        assert_eq!(parse_id(&json!(42)), Some(42));
        assert_eq!(parse_id(&json!("17")), Some(17));
        assert_eq!(parse_id(&json!("x17")), None);
        assert_eq!(parse_id(&json!(-1)), None);
        assert_eq!(parse_id(&json!(null)), None);
    }
}
