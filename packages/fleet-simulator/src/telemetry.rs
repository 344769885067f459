//! telemetry.rs — Randomized readings for simulated devices
//!
//! Status codes are drawn from ordered `(code, weight)` tables. The relay
//! tables are built per case (day/night × dimmer fitted) so that a relay
//! without a dimmer can never be handed the dimmed code.
//!
//! Numeric readings are bounded uniform draws. All samplers take the RNG
//! by `&mut impl Rng` so a seeded `StdRng` reproduces a whole fleet.

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveTime};
use indexmap::IndexMap;
use lighting_types::{ConcentratorStatus, RelayStatus, TopologyConcentrator, TopologyRelay};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::clock::SimContext;
use crate::fleet::{
    Capabilities, Concentrator, ConcentratorDetails, ConnectionType, Electrical, FaultCode,
    MotionReading, Relay, SwitchType, TimeProgram,
};
use crate::power::{self, round2};

// ── Weighted tables ───────────────────────────────────────────────────────────

/// Ordered categorical distribution with a fallback for the leftover mass.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedTable<T> {
    entries: Vec<(T, f64)>,
    fallback: T,
}

impl<T: Copy + PartialEq> WeightedTable<T> {
    pub fn new(entries: Vec<(T, f64)>, fallback: T) -> Self {
        Self { entries, fallback }
    }

    pub fn entries(&self) -> &[(T, f64)] {
        &self.entries
    }

    pub fn fallback(&self) -> T {
        self.fallback
    }

    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|(_, w)| w.max(0.0)).sum()
    }

    pub fn weight_of(&self, code: T) -> f64 {
        self.entries
            .iter()
            .filter(|(c, _)| *c == code)
            .map(|(_, w)| w.max(0.0))
            .sum()
    }

    /// First code whose cumulative weight reaches `r`. Non-positive weights
    /// never match.
    pub fn pick(&self, r: f64) -> T {
        let mut cumulative = 0.0;
        for &(code, weight) in &self.entries {
            if weight <= 0.0 {
                continue;
            }
            cumulative += weight;
            if cumulative >= r {
                return code;
            }
        }
        self.fallback
    }

    pub fn sample(&self, rng: &mut impl Rng) -> T {
        self.pick(rng.gen::<f64>())
    }
}

pub fn concentrator_status_table() -> WeightedTable<ConcentratorStatus> {
    use ConcentratorStatus::*;
    WeightedTable::new(
        vec![
            (Offline30Min, 0.05),
            (Offline60Min, 0.05),
            (OnlineCellular, 0.40),
            (OnlineWired, 0.40),
            (Offline, 0.05),
            (NeverConnected, 0.05),
        ],
        OnlineCellular,
    )
}

pub fn relay_status_table(is_night: bool, has_dimmer: bool) -> WeightedTable<RelayStatus> {
    use RelayStatus::*;

    let faults = |w: f64| [(PowerDrop, w), (Fault, w), (NoCommunication, w), (NoReadings, w)];

    let entries: Vec<(RelayStatus, f64)> = if is_night {
        let (on, off_at_night) = if has_dimmer { (0.75, 0.03) } else { (0.85, 0.05) };
        let dimmed = has_dimmer.then_some((Dimmed, 0.10));
        [(On, on), (Off, 0.03)]
            .into_iter()
            .chain(dimmed)
            .chain([(OffDuringNight, off_at_night)])
            .chain(faults(0.002))
            .chain([(LowVoltage, 0.001), (HighVoltage, 0.001)])
            .collect()
    } else {
        let off = if has_dimmer { 0.975 } else { 0.98 };
        let dimmed = has_dimmer.then_some((Dimmed, 0.002));
        [(Off, off), (On, 0.01)]
            .into_iter()
            .chain(dimmed)
            .chain([(OnDuringDay, 0.002)])
            .chain(faults(0.001))
            .chain([(LowVoltage, 0.0005), (HighVoltage, 0.0005)])
            .collect()
    };

    WeightedTable::new(entries, RelayStatus::switched(is_night))
}

pub fn sample_concentrator_status(rng: &mut impl Rng) -> ConcentratorStatus {
    concentrator_status_table().sample(rng)
}

pub fn sample_relay_status(rng: &mut impl Rng, is_night: bool, has_dimmer: bool) -> RelayStatus {
    relay_status_table(is_night, has_dimmer).sample(rng)
}

// ── Field samplers ────────────────────────────────────────────────────────────

pub fn sample_initial_on(rng: &mut impl Rng, is_night: bool) -> bool {
    rng.gen_bool(if is_night { 0.99 } else { 0.01 })
}

/// Lux reading: dark at night, bright by day.
pub fn sample_ambient_light(rng: &mut impl Rng, is_night: bool) -> u32 {
    if is_night {
        rng.gen_range(0..100)
    } else {
        rng.gen_range(500..1000)
    }
}

pub fn sample_relay_voltage(rng: &mut impl Rng) -> f64 {
    f64::from(rng.gen_range(200u32..240))
}

pub fn sample_current(rng: &mut impl Rng) -> f64 {
    round2(Uniform::new(1.0, 4.0).sample(rng))
}

pub fn sample_power_factor(rng: &mut impl Rng) -> f64 {
    round2(Uniform::new_inclusive(0.8, 1.0).sample(rng))
}

pub fn sample_line_loss(rng: &mut impl Rng) -> f64 {
    f64::from(rng.gen_range(0u32..20))
}

pub fn sample_concentrator_voltage(rng: &mut impl Rng) -> u32 {
    rng.gen_range(210..260)
}

pub fn sample_hardware_version(rng: &mut impl Rng) -> String {
    format!("v{}.{}", rng.gen_range(1..=5), rng.gen_range(0..10))
}

pub fn sample_software_version(rng: &mut impl Rng) -> String {
    format!("v{}.{}.{}", rng.gen_range(1..=3), rng.gen_range(0..20), rng.gen_range(0..100))
}

pub fn sample_ip(rng: &mut impl Rng) -> String {
    format!("192.168.{}.{}", rng.gen_range(0..=255), rng.gen_range(1..255))
}

/// A moment up to `max_age` before `now`.
pub fn sample_past(
    rng: &mut impl Rng,
    now: DateTime<FixedOffset>,
    max_age: ChronoDuration,
) -> DateTime<FixedOffset> {
    let secs = rng.gen_range(0..max_age.num_seconds().max(1));
    now - ChronoDuration::seconds(secs)
}

fn sample_clock_time(rng: &mut impl Rng, hours: std::ops::Range<u32>) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(rng.gen_range(hours) % 24, rng.gen_range(0..60), rng.gen_range(0..60))
}

pub fn sample_capabilities(rng: &mut impl Rng) -> Capabilities {
    Capabilities {
        dimmer_present: rng.gen_bool(0.6),
        light_sensor_present: rng.gen_bool(0.95),
        temperature_sensor_present: rng.gen_bool(0.4),
        humidity_sensor_present: rng.gen_bool(0.3),
        motion_sensor_present: rng.gen_bool(0.2),
        gps_present: rng.gen_bool(0.7),
    }
}

const OBSERVATIONS: [&str; 10] = [
    "Damaged pole",
    "Faulty luminaire",
    "Exposed cable",
    "Preventive maintenance due",
    "Broken glass",
    "Oxidation detected",
    "Needs cleaning",
    "Position adjustment",
    "Sways in the wind",
    "Insufficient lighting",
];

pub fn sample_observation(rng: &mut impl Rng) -> String {
    OBSERVATIONS[rng.gen_range(0..OBSERVATIONS.len())].to_string()
}

pub fn sample_fault(rng: &mut impl Rng) -> FaultCode {
    FaultCode::ALL[rng.gen_range(0..FaultCode::ALL.len())]
}

/// Fault a relay raises while it reports `status`.
pub fn fault_for_status(status: RelayStatus) -> Option<FaultCode> {
    match status {
        RelayStatus::Fault => Some(FaultCode::LampFailure),
        RelayStatus::PowerDrop => Some(FaultCode::PowerSupplyIssue),
        RelayStatus::NoCommunication => Some(FaultCode::CommunicationLoss),
        RelayStatus::LowVoltage => Some(FaultCode::VoltageDrop),
        _ => None,
    }
}

// ── Entity samplers ───────────────────────────────────────────────────────────

/// Switching state implied by a status code, if any.
fn implied_on(status: RelayStatus) -> Option<bool> {
    match status {
        RelayStatus::On | RelayStatus::OnDuringDay | RelayStatus::Dimmed => Some(true),
        RelayStatus::Off | RelayStatus::OffDuringNight => Some(false),
        _ => None,
    }
}

/// Build a fresh relay for one topology record.
pub fn spawn_relay(
    rng: &mut impl Rng,
    ctx: &SimContext,
    concentrator_id: u32,
    seed: &TopologyRelay,
) -> Relay {
    let capabilities = sample_capabilities(rng);
    let status = sample_relay_status(rng, ctx.is_night, capabilities.dimmer_present);
    let is_on = implied_on(status).unwrap_or_else(|| sample_initial_on(rng, ctx.is_night));

    let dimmer_value = (capabilities.dimmer_present && rng.gen_bool(0.3))
        .then(|| rng.gen_range(50u8..100));
    let current_dimmer_value = match (capabilities.dimmer_present, dimmer_value) {
        (false, _) => 0,
        (true, Some(value)) => value,
        (true, None) if is_on => 100,
        (true, None) => 0,
    };

    let programming_hour = rng.gen_bool(0.5);
    let hour_programming_value = programming_hour
        .then(|| TimeProgram::parse("18:00", "06:00").ok())
        .flatten();

    let (lighting_time, time_on_secs) = if is_on {
        (sample_clock_time(rng, 18..24), rng.gen_range(0..12 * 3600))
    } else {
        (None, 0)
    };
    let shutdown_time = if is_on { None } else { sample_clock_time(rng, 5..8) };

    let failure_detected = fault_for_status(status);
    let last_detected_failure = failure_detected.or_else(|| rng.gen_bool(0.2).then(|| sample_fault(rng)));
    let last_detected_failure_date = last_detected_failure
        .map(|_| sample_past(rng, ctx.now, ChronoDuration::days(30)));

    let motion = capabilities.motion_sensor_present.then(|| {
        let detected = rng.gen_bool(0.5);
        MotionReading {
            level: if detected { rng.gen_range(40..=100) } else { 0 },
            last_detected: detected
                .then(|| sample_past(rng, ctx.now, ChronoDuration::hours(24))),
            detected_count: rng.gen_range(0..50),
        }
    });

    let mut relay = Relay {
        id_relay: seed.id,
        id_concentrator: concentrator_id,
        label: format!("REL_{}", seed.id),
        latitude: seed.latitude,
        longitude: seed.longitude,
        capabilities,
        is_on,
        status,
        dimmer_programming: dimmer_value.is_some(),
        dimmer_programming_value: dimmer_value,
        current_dimmer_value,
        is_light_sensor_enabled: capabilities.light_sensor_present,
        programming_hour,
        hour_programming_value,
        electrical: Electrical {
            voltage: sample_relay_voltage(rng),
            current: sample_current(rng),
            power_factor: sample_power_factor(rng),
            apparent_power: 0.0,
            active_power: 0.0,
            reactive_power: 0.0,
            total_power: 0.0,
            active_energy: Uniform::new(1000.0, 6000.0).sample(rng),
            frequency_hz: 60,
            line_loss_w: sample_line_loss(rng),
        },
        ambient_light: sample_ambient_light(rng, ctx.is_night),
        temperature_c: capabilities
            .temperature_sensor_present
            .then(|| (Uniform::new(15.0, 35.0).sample(rng) * 10.0_f64).round() / 10.0),
        humidity_pct: capabilities
            .humidity_sensor_present
            .then(|| rng.gen_range(30..90)),
        motion,
        lighting_time,
        shutdown_time,
        time_on_secs,
        signal_dbm: rng.gen_range(-80..-40),
        number_of_lights: rng.gen_range(1..=3),
        firmware_version: sample_software_version(rng),
        hardware_version: sample_hardware_version(rng),
        installation_date: sample_past(rng, ctx.now, ChronoDuration::days(3 * 365)),
        sector: rng.gen_bool(0.5).then(|| rng.gen_range(1..=12)),
        sub_sector: rng.gen_bool(0.6).then(|| rng.gen_range(1..=5)),
        area_group: rng.gen_bool(0.5).then(|| rng.gen_range(1..=3)),
        switch_type: if rng.gen_bool(0.5) { SwitchType::NormallyOpen } else { SwitchType::NormallyClosed },
        observation: rng.gen_bool(0.3).then(|| sample_observation(rng)),
        failure_detected,
        last_detected_failure,
        last_detected_failure_date,
    };
    power::compute_power(&mut relay);
    relay
}

/// Build a concentrator and all of its relays for one topology record.
pub fn spawn_concentrator(
    rng: &mut impl Rng,
    ctx: &SimContext,
    seed: &TopologyConcentrator,
) -> Concentrator {
    let status = sample_concentrator_status(rng);
    let connection_type = if rng.gen_bool(0.8) { ConnectionType::Lte } else { ConnectionType::Umts };

    let mut details = ConcentratorDetails::new(
        seed.id,
        seed.point.latitude,
        seed.point.longitude,
        sample_hardware_version(rng),
        sample_software_version(rng),
        sample_concentrator_voltage(rng),
        rng.gen_range(-70..-40),
        sample_ip(rng),
        connection_type,
        status,
        sample_past(rng, ctx.now, ChronoDuration::minutes(5)),
        sample_past(rng, ctx.now, ChronoDuration::days(3 * 365)),
    );

    match status {
        ConcentratorStatus::NeverConnected => {}
        s if s.is_online() => {
            details.connected_since = Some(sample_past(rng, ctx.now, ChronoDuration::days(30)));
        }
        _ => {
            details.connected_since = Some(sample_past(rng, ctx.now, ChronoDuration::days(30)));
            details.disconnected_since = Some(sample_past(rng, ctx.now, ChronoDuration::hours(2)));
        }
    }

    let relays: IndexMap<_, _> = seed
        .relays
        .iter()
        .map(|r| (r.id, spawn_relay(rng, ctx, seed.id, r)))
        .collect();

    Concentrator::new(details, relays)
}

/// Deterministic relay for unit tests across the crate.
#[cfg(test)]
pub(crate) fn test_relay(is_on: bool) -> Relay {
    use rand::{rngs::StdRng, SeedableRng};

    let ctx = if is_on { crate::clock::test_support::night() } else { crate::clock::test_support::day() };
    let mut rng = StdRng::seed_from_u64(7);
    let mut relay = spawn_relay(&mut rng, &ctx, 1, &TopologyRelay { id: 1, latitude: -23.5, longitude: -46.6 });
    relay.is_on = is_on;
    relay.status = RelayStatus::switched(is_on);
    power::compute_power(&mut relay);
    relay
}
