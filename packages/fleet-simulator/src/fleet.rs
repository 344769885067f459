//! fleet.rs — Concentrator and relay state
//!
//! A concentrator owns its relays for the whole run. Relays are never added
//! or removed after construction, so `total_relays` is fixed when the
//! concentrator is built and cannot drift from the owned map.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveTime};
use indexmap::IndexMap;
use lighting_types::{
    format_coordinate, ConcentratorId, ConcentratorStatus, ConcentratorSummary, RelayId,
    RelayStatus, RelaySummary,
};
use serde::{Serialize, Serializer};

use crate::clock::SimContext;
use crate::error::FleetError;

// ── Capabilities ──────────────────────────────────────────────────────────────

/// Hardware fitted to a relay. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub dimmer_present: bool,
    pub light_sensor_present: bool,
    pub temperature_sensor_present: bool,
    pub humidity_sensor_present: bool,
    pub motion_sensor_present: bool,
    pub gps_present: bool,
}

impl Capabilities {
    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Dimmer => self.dimmer_present,
            Capability::LightSensor => self.light_sensor_present,
        }
    }
}

/// Capabilities a command can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Dimmer,
    LightSensor,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dimmer => "dimmer",
            Self::LightSensor => "light sensor",
        })
    }
}

// ── Electrical ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Electrical {
    pub voltage: f64,
    pub current: f64,
    pub power_factor: f64,
    pub apparent_power: f64,
    pub active_power: f64,
    pub reactive_power: f64,
    pub total_power: f64,
    /// kWh, kept at full precision
    #[serde(serialize_with = "serialize_two_decimals")]
    pub active_energy: f64,
    #[serde(rename = "frequency")]
    pub frequency_hz: u32,
    /// Wiring loss added on top of active power, sampled once per relay
    #[serde(skip)]
    pub line_loss_w: f64,
}

// ── Programs & readings ───────────────────────────────────────────────────────

/// Daily on/off schedule at minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeProgram {
    pub on: NaiveTime,
    pub off: NaiveTime,
}

impl TimeProgram {
    /// Parse a pair of `HH:MM` strings.
    pub fn parse(on: &str, off: &str) -> Result<Self, FleetError> {
        Ok(Self {
            on: parse_hhmm(on)?,
            off: parse_hhmm(off)?,
        })
    }
}

fn parse_hhmm(raw: &str) -> Result<NaiveTime, FleetError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| FleetError::Validation(format!("'{raw}' is not a HH:MM time")))
}

impl fmt::Display for TimeProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.on.format("%H:%M"), self.off.format("%H:%M"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionReading {
    pub level: u8,
    pub last_detected: Option<DateTime<FixedOffset>>,
    pub detected_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwitchType {
    #[serde(rename = "NO")]
    NormallyOpen,
    #[serde(rename = "NC")]
    NormallyClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionType {
    #[serde(rename = "4G")]
    Lte,
    #[serde(rename = "3G")]
    Umts,
}

/// Fault codes a relay reports to its concentrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultCode {
    LampFailure,
    VoltageDrop,
    Overheat,
    CommunicationLoss,
    SensorError,
    DimmerFault,
    PowerSupplyIssue,
    RelayStuck,
    ShortCircuit,
    Overcurrent,
}

impl FaultCode {
    pub const ALL: [FaultCode; 10] = [
        Self::LampFailure,
        Self::VoltageDrop,
        Self::Overheat,
        Self::CommunicationLoss,
        Self::SensorError,
        Self::DimmerFault,
        Self::PowerSupplyIssue,
        Self::RelayStuck,
        Self::ShortCircuit,
        Self::Overcurrent,
    ];
}

// ── Relay ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Relay {
    pub id_relay: RelayId,
    pub id_concentrator: ConcentratorId,
    pub label: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(flatten)]
    pub(crate) capabilities: Capabilities,

    pub is_on: bool,
    pub status: RelayStatus,
    pub dimmer_programming: bool,
    #[serde(serialize_with = "serialize_percentage")]
    pub dimmer_programming_value: Option<u8>,
    pub current_dimmer_value: u8,
    pub is_light_sensor_enabled: bool,
    pub programming_hour: bool,
    #[serde(serialize_with = "serialize_program")]
    pub hour_programming_value: Option<TimeProgram>,

    #[serde(flatten)]
    pub electrical: Electrical,

    pub ambient_light: u32,
    #[serde(rename = "temperature", skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    #[serde(rename = "humidity", skip_serializing_if = "Option::is_none")]
    pub humidity_pct: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion: Option<MotionReading>,

    #[serde(serialize_with = "serialize_clock_time")]
    pub lighting_time: Option<NaiveTime>,
    #[serde(serialize_with = "serialize_clock_time")]
    pub shutdown_time: Option<NaiveTime>,
    #[serde(rename = "timeOn", serialize_with = "serialize_duration")]
    pub time_on_secs: u64,

    pub signal_dbm: i32,
    pub number_of_lights: u8,
    pub firmware_version: String,
    pub hardware_version: String,
    pub installation_date: DateTime<FixedOffset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_sector: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_group: Option<u8>,
    pub switch_type: SwitchType,

    /// Free-text note left by a field technician.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
    /// Fault currently raised, if any.
    pub failure_detected: Option<FaultCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_detected_failure: Option<FaultCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_detected_failure_date: Option<DateTime<FixedOffset>>,
}

impl Relay {
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn key(&self) -> (ConcentratorId, RelayId) {
        (self.id_concentrator, self.id_relay)
    }

    pub fn summary(&self) -> RelaySummary {
        RelaySummary {
            id_relay: self.id_relay,
            label: self.label.clone(),
            id_concentrator: self.id_concentrator,
            lat: format_coordinate(self.latitude),
            lng: format_coordinate(self.longitude),
            status: self.status,
            status_description: self.status.description().to_string(),
        }
    }

    /// Light the luminaire and stamp the lighting time.
    pub fn switch_on(&mut self, ctx: &SimContext) {
        self.is_on = true;
        self.status = RelayStatus::On;
        self.lighting_time = Some(ctx.time_of_day());
    }

    /// Darken the luminaire, stamp the shutdown time and reset the on-timer.
    pub fn switch_off(&mut self, ctx: &SimContext) {
        self.is_on = false;
        self.status = RelayStatus::Off;
        self.shutdown_time = Some(ctx.time_of_day());
        self.time_on_secs = 0;
    }

    pub fn time_on(&self) -> String {
        format_duration(self.time_on_secs)
    }

    /// Replace the fitted hardware. State that only removed hardware could
    /// hold is cleared; readings for newly fitted sensors start on the next tick.
    pub fn refit(&mut self, capabilities: Capabilities) {
        self.capabilities = capabilities;
        if !capabilities.dimmer_present {
            self.dimmer_programming = false;
            self.dimmer_programming_value = None;
            self.current_dimmer_value = 0;
            if self.status == RelayStatus::Dimmed {
                self.status = RelayStatus::switched(self.is_on);
            }
        }
        if !capabilities.light_sensor_present {
            self.is_light_sensor_enabled = false;
        }
        if !capabilities.temperature_sensor_present {
            self.temperature_c = None;
        }
        if !capabilities.humidity_sensor_present {
            self.humidity_pct = None;
        }
        if !capabilities.motion_sensor_present {
            self.motion = None;
        }
    }
}

// ── Concentrator ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcentratorDetails {
    pub id: ConcentratorId,
    pub label: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Street address; empty until an operator fills it in.
    pub address: String,
    pub hardware_version: String,
    pub software_version: String,
    pub voltage: u32,
    pub signal_dbm: i32,
    pub ip: String,
    pub connection_type: ConnectionType,
    pub status: ConcentratorStatus,
    pub last_readings: DateTime<FixedOffset>,
    pub connected_since: Option<DateTime<FixedOffset>>,
    pub disconnected_since: Option<DateTime<FixedOffset>>,
    pub installation_date: DateTime<FixedOffset>,
    total_relays: usize,
}

impl ConcentratorDetails {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ConcentratorId,
        latitude: f64,
        longitude: f64,
        hardware_version: String,
        software_version: String,
        voltage: u32,
        signal_dbm: i32,
        ip: String,
        connection_type: ConnectionType,
        status: ConcentratorStatus,
        last_readings: DateTime<FixedOffset>,
        installation_date: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            id,
            label: format!("CON_{id}"),
            latitude,
            longitude,
            address: String::new(),
            hardware_version,
            software_version,
            voltage,
            signal_dbm,
            ip,
            connection_type,
            status,
            last_readings,
            connected_since: None,
            disconnected_since: None,
            installation_date,
            total_relays: 0,
        }
    }

    pub fn total_relays(&self) -> usize {
        self.total_relays
    }
}

#[derive(Debug, Clone)]
pub struct Concentrator {
    details: ConcentratorDetails,
    relays: IndexMap<RelayId, Relay>,
}

impl Concentrator {
    pub fn new(mut details: ConcentratorDetails, relays: IndexMap<RelayId, Relay>) -> Self {
        details.total_relays = relays.len();
        Self { details, relays }
    }

    pub fn id(&self) -> ConcentratorId {
        self.details.id
    }

    pub fn details(&self) -> &ConcentratorDetails {
        &self.details
    }

    pub fn details_mut(&mut self) -> &mut ConcentratorDetails {
        &mut self.details
    }

    pub fn summary(&self) -> ConcentratorSummary {
        ConcentratorSummary {
            id: self.details.id,
            label: self.details.label.clone(),
            lat: format_coordinate(self.details.latitude),
            lng: format_coordinate(self.details.longitude),
            status: self.details.status,
            status_description: self.details.status.description().to_string(),
        }
    }

    pub fn relay(&self, id: RelayId) -> Option<&Relay> {
        self.relays.get(&id)
    }

    pub fn relay_mut(&mut self, id: RelayId) -> Option<&mut Relay> {
        self.relays.get_mut(&id)
    }

    pub fn relays(&self) -> impl ExactSizeIterator<Item = &Relay> {
        self.relays.values()
    }

    pub fn relays_mut(&mut self) -> impl ExactSizeIterator<Item = &mut Relay> {
        self.relays.values_mut()
    }

    pub fn relay_count(&self) -> usize {
        self.relays.len()
    }

    /// Stamp fresh readings from the gateway.
    pub fn touch(&mut self, now: DateTime<FixedOffset>) {
        self.details.last_readings = now;
    }
}

// ── Wire formatting ───────────────────────────────────────────────────────────

pub fn format_duration(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn serialize_two_decimals<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(crate::power::round2(*value))
}

fn serialize_percentage<S: Serializer>(value: &Option<u8>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(p) => s.serialize_str(&format!("{p}%")),
        None => s.serialize_str(""),
    }
}

fn serialize_program<S: Serializer>(value: &Option<TimeProgram>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(program) => s.collect_str(program),
        None => s.serialize_str(""),
    }
}

fn serialize_clock_time<S: Serializer>(value: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(t) => s.collect_str(&t.format("%H:%M:%S")),
        None => s.serialize_none(),
    }
}

fn serialize_duration<S: Serializer>(secs: &u64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_duration(*secs))
}
