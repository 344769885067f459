//! tick.rs — One sweep of the periodic fleet advance
//!
//! Each tick resamples ambient light, runs the automatic on/off controls,
//! drifts the environmental sensors, settles the dimmer, repairs states that
//! contradict the hardware or the time of day, and finally accrues energy and
//! recomputes power.
//!
//! A relay whose electrical readings are unusable is skipped for the energy
//! and power steps only. Its failure is reported and the sweep carries on.

use std::fmt;

use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::Serialize;
use tracing::warn;

use lighting_types::RelayStatus;

use crate::clock::SimContext;
use crate::error::TickError;
use crate::fleet::{MotionReading, Relay};
use crate::power;
use crate::registry::DeviceRegistry;
use crate::telemetry;

/// Below this many lux a dark night switches the luminaire on.
pub const NIGHT_THRESHOLD_LUX: u32 = 150;
/// Above this many lux daylight switches the luminaire off.
pub const DAY_THRESHOLD_LUX: u32 = 400;

const NIGHT_MOTION_CHANCE: f64 = 0.15;
const DAY_MOTION_CHANCE: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct TickSettings {
    /// Chance that a concentrator refreshes its last-readings stamp per tick
    pub heartbeat_probability: f64,
}

impl Default for TickSettings {
    fn default() -> Self {
        Self { heartbeat_probability: 0.1 }
    }
}

/// Corrections made while enforcing the relay invariants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub relays_checked: usize,
    pub invalid_dimmer_status: usize,
    pub invalid_time_status: usize,
    pub corrected: usize,
}

impl ConsistencyReport {
    fn absorb(&mut self, other: ConsistencyReport) {
        self.relays_checked += other.relays_checked;
        self.invalid_dimmer_status += other.invalid_dimmer_status;
        self.invalid_time_status += other.invalid_time_status;
        self.corrected += other.corrected;
    }
}

#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub relays_advanced: usize,
    pub switched_on: usize,
    pub switched_off: usize,
    pub heartbeats: usize,
    pub repairs: ConsistencyReport,
    pub failures: Vec<TickError>,
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} relays advanced, {} on / {} off by automation, {} heartbeats, {} repairs, {} failures",
            self.relays_advanced,
            self.switched_on,
            self.switched_off,
            self.heartbeats,
            self.repairs.corrected,
            self.failures.len()
        )
    }
}

// ── Sweep ─────────────────────────────────────────────────────────────────────

pub fn advance(
    registry: &mut DeviceRegistry,
    rng: &mut impl Rng,
    ctx: &SimContext,
    settings: &TickSettings,
) -> TickReport {
    let heartbeat = match settings.heartbeat_probability {
        p if p.is_finite() => p.clamp(0.0, 1.0),
        _ => 0.0,
    };
    let mut report = TickReport::default();

    for concentrator in registry.concentrators_mut() {
        if rng.gen_bool(heartbeat) {
            concentrator.touch(ctx.now);
            report.heartbeats += 1;
        }
        for relay in concentrator.relays_mut() {
            match advance_relay(relay, rng, ctx, &mut report) {
                Ok(()) => report.relays_advanced += 1,
                Err(e) => {
                    warn!("⚠️  {e}");
                    report.failures.push(e);
                }
            }
        }
    }
    report
}

fn advance_relay(
    relay: &mut Relay,
    rng: &mut impl Rng,
    ctx: &SimContext,
    report: &mut TickReport,
) -> Result<(), TickError> {
    relay.ambient_light = telemetry::sample_ambient_light(rng, ctx.is_night);

    match automatic_switch(relay, ctx) {
        Some(true) => {
            relay.switch_on(ctx);
            report.switched_on += 1;
        }
        Some(false) => {
            relay.switch_off(ctx);
            report.switched_off += 1;
        }
        None => {}
    }

    drift_environment(relay, rng);
    update_motion(relay, rng, ctx);
    settle_dimmer(relay);

    let mut repairs = ConsistencyReport::default();
    repair(relay, ctx.is_night, &mut repairs);
    report.repairs.absorb(repairs);

    power::check_readings(relay)?;
    if relay.is_on {
        relay.time_on_secs += ctx.elapsed.as_secs_f64().round() as u64;
    }
    power::accrue_energy(relay, ctx.elapsed_hours());
    power::compute_power(relay);
    Ok(())
}

// ── Automatic control ─────────────────────────────────────────────────────────

/// `Some(true)` to switch on, `Some(false)` to switch off.
fn automatic_switch(relay: &Relay, ctx: &SimContext) -> Option<bool> {
    if relay.programming_hour {
        let program = relay.hour_programming_value?;
        let minute = ctx.minute_of_day();
        return if minute == program.on && !relay.is_on {
            Some(true)
        } else if minute == program.off && relay.is_on {
            Some(false)
        } else {
            None
        };
    }

    if !(relay.capabilities().light_sensor_present && relay.is_light_sensor_enabled) {
        return None;
    }
    if relay.ambient_light < NIGHT_THRESHOLD_LUX && !relay.is_on && ctx.is_night {
        Some(true)
    } else if relay.ambient_light > DAY_THRESHOLD_LUX && relay.is_on && !ctx.is_night {
        Some(false)
    } else {
        None
    }
}

// ── Sensors ───────────────────────────────────────────────────────────────────

fn drift_environment(relay: &mut Relay, rng: &mut impl Rng) {
    let caps = relay.capabilities();
    if caps.temperature_sensor_present {
        let t = relay.temperature_c.unwrap_or(25.0) + Uniform::new_inclusive(-2.0, 2.0).sample(rng);
        relay.temperature_c = Some((t.clamp(10.0, 40.0) * 10.0).round() / 10.0);
    }
    if caps.humidity_sensor_present {
        let h = i32::from(relay.humidity_pct.unwrap_or(60)) + rng.gen_range(-5..=5);
        relay.humidity_pct = Some(h.clamp(20, 95) as u8);
    }
}

fn update_motion(relay: &mut Relay, rng: &mut impl Rng, ctx: &SimContext) {
    if !relay.capabilities().motion_sensor_present {
        return;
    }
    let chance = if ctx.is_night { NIGHT_MOTION_CHANCE } else { DAY_MOTION_CHANCE };
    let motion = relay.motion.get_or_insert_with(|| MotionReading {
        level: 0,
        last_detected: None,
        detected_count: 0,
    });
    if rng.gen_bool(chance) {
        motion.level = rng.gen_range(40..=100);
        motion.last_detected = Some(ctx.now);
        motion.detected_count += 1;
    } else {
        motion.level = motion.level.saturating_sub(rng.gen_range(0..10));
    }
}

fn settle_dimmer(relay: &mut Relay) {
    if !relay.capabilities().dimmer_present {
        relay.current_dimmer_value = 0;
        return;
    }
    relay.current_dimmer_value = match (relay.dimmer_programming, relay.dimmer_programming_value) {
        (true, Some(value)) => value,
        _ if relay.is_on => 100,
        _ => 0,
    };
}

// ── Consistency ───────────────────────────────────────────────────────────────

/// Bring one relay back in line with its hardware and the time of day.
pub fn repair(relay: &mut Relay, is_night: bool, report: &mut ConsistencyReport) {
    let caps = relay.capabilities();
    report.relays_checked += 1;

    if !caps.dimmer_present {
        if relay.status == RelayStatus::Dimmed {
            relay.status = RelayStatus::switched(relay.is_on);
            report.invalid_dimmer_status += 1;
            report.corrected += 1;
        }
        if relay.dimmer_programming || relay.dimmer_programming_value.is_some() {
            relay.dimmer_programming = false;
            relay.dimmer_programming_value = None;
            report.corrected += 1;
        }
        relay.current_dimmer_value = 0;
    }

    match relay.status {
        RelayStatus::OnDuringDay if is_night => {
            relay.status = RelayStatus::On;
            report.invalid_time_status += 1;
            report.corrected += 1;
        }
        RelayStatus::OffDuringNight if !is_night => {
            relay.status = RelayStatus::Off;
            report.invalid_time_status += 1;
            report.corrected += 1;
        }
        _ => {}
    }

    if relay.is_light_sensor_enabled && !caps.light_sensor_present {
        relay.is_light_sensor_enabled = false;
        report.corrected += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::{context_at_hour, day, night};
    use crate::fleet::TimeProgram;
    use crate::registry::test_support::registry;
    use crate::telemetry::test_relay;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn light_sensor_switches_on_in_the_dark() {
        let ctx = night();
        let mut relay = test_relay(false);
        relay.capabilities.light_sensor_present = true;
        relay.is_light_sensor_enabled = true;
        relay.programming_hour = false;
        relay.ambient_light = 20;
        assert_eq!(automatic_switch(&relay, &ctx), Some(true));

        relay.ambient_light = 200;
        assert_eq!(automatic_switch(&relay, &ctx), None);
        relay.is_light_sensor_enabled = false;
        relay.ambient_light = 20;
        assert_eq!(automatic_switch(&relay, &ctx), None);
    }

    #[test]
    fn light_sensor_switches_off_in_daylight() {
        let mut relay = test_relay(true);
        relay.capabilities.light_sensor_present = true;
        relay.is_light_sensor_enabled = true;
        relay.programming_hour = false;
        relay.ambient_light = 800;
        assert_eq!(automatic_switch(&relay, &day()), Some(false));
        assert_eq!(automatic_switch(&relay, &night()), None);
    }

    #[test]
    fn time_program_wins_over_light_sensor() {
        // context_at_hour stamps HH:30:15
        let ctx = context_at_hour(19, 5);
        let mut relay = test_relay(false);
        relay.capabilities.light_sensor_present = true;
        relay.is_light_sensor_enabled = true;
        relay.ambient_light = 20;
        relay.programming_hour = true;
        relay.hour_programming_value = Some(TimeProgram::parse("20:00", "06:00").unwrap());
        assert_eq!(automatic_switch(&relay, &ctx), None);

        relay.hour_programming_value = Some(TimeProgram::parse("19:30", "06:00").unwrap());
        assert_eq!(automatic_switch(&relay, &ctx), Some(true));
        relay.is_on = true;
        assert_eq!(automatic_switch(&relay, &ctx), None);

        let morning = context_at_hour(6, 5);
        relay.hour_programming_value = Some(TimeProgram::parse("19:30", "06:30").unwrap());
        assert_eq!(automatic_switch(&relay, &morning), Some(false));
    }

    #[test]
    fn repair_fixes_dimmer_and_time_contradictions() {
        let mut relay = test_relay(true);
        relay.capabilities.dimmer_present = false;
        relay.capabilities.light_sensor_present = false;
        relay.status = RelayStatus::Dimmed;
        relay.dimmer_programming = true;
        relay.is_light_sensor_enabled = true;

        let mut report = ConsistencyReport::default();
        repair(&mut relay, true, &mut report);
        assert_eq!(relay.status, RelayStatus::On);
        assert!(!relay.dimmer_programming);
        assert!(!relay.is_light_sensor_enabled);
        assert_eq!(report.invalid_dimmer_status, 1);
        assert_eq!(report.corrected, 3);

        relay.status = RelayStatus::OnDuringDay;
        repair(&mut relay, true, &mut report);
        assert_eq!(relay.status, RelayStatus::On);

        relay.status = RelayStatus::OffDuringNight;
        repair(&mut relay, false, &mut report);
        assert_eq!(relay.status, RelayStatus::Off);
        assert_eq!(report.invalid_time_status, 2);
        assert_eq!(report.relays_checked, 3);
    }

    #[test]
    fn environment_drifts_within_bounds() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut relay = test_relay(true);
        relay.capabilities.temperature_sensor_present = true;
        relay.capabilities.humidity_sensor_present = true;
        relay.temperature_c = Some(39.5);
        relay.humidity_pct = Some(22);
        for _ in 0..500 {
            drift_environment(&mut relay, &mut rng);
            let t = relay.temperature_c.unwrap();
            let h = relay.humidity_pct.unwrap();
            assert!((10.0..=40.0).contains(&t));
            assert!((20..=95).contains(&h));
        }
    }

    #[test]
    fn motion_detections_are_counted() {
        let ctx = night();
        let mut rng = StdRng::seed_from_u64(8);
        let mut relay = test_relay(true);
        relay.capabilities.motion_sensor_present = true;
        relay.motion = None;
        for _ in 0..200 {
            update_motion(&mut relay, &mut rng, &ctx);
        }
        let motion = relay.motion.clone().unwrap();
        assert!(motion.detected_count > 0);
        assert_eq!(motion.last_detected, Some(ctx.now));
        assert!(motion.level <= 100);
    }

    #[test]
    fn dimmer_value_tracks_program_and_state() {
        let mut relay = test_relay(true);
        relay.capabilities.dimmer_present = true;
        relay.dimmer_programming = true;
        relay.dimmer_programming_value = Some(65);
        settle_dimmer(&mut relay);
        assert_eq!(relay.current_dimmer_value, 65);

        relay.dimmer_programming = false;
        settle_dimmer(&mut relay);
        assert_eq!(relay.current_dimmer_value, 100);

        relay.capabilities.dimmer_present = false;
        settle_dimmer(&mut relay);
        assert_eq!(relay.current_dimmer_value, 0);
    }

    #[test]
    fn sweep_isolates_broken_relay() {
        let ctx = night();
        let mut fleet = registry(&ctx, 2, 3);
        fleet.locate_mut(1, 2).unwrap().electrical.voltage = f64::INFINITY;
        let mut rng = StdRng::seed_from_u64(1);

        let report = advance(&mut fleet, &mut rng, &ctx, &TickSettings::default());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.relays_advanced, 5);
        assert!(matches!(
            report.failures[0],
            TickError::NonFiniteReading { concentrator_id: 1, relay_id: 2, field: "voltage" }
        ));
    }

    #[test]
    fn on_time_accumulates_for_lit_relays() {
        let ctx = night();
        let mut fleet = registry(&ctx, 1, 1);
        {
            let relay = fleet.locate_mut(1, 1).unwrap();
            relay.is_on = true;
            relay.time_on_secs = 0;
            relay.programming_hour = false;
            relay.is_light_sensor_enabled = false;
        }
        let mut rng = StdRng::seed_from_u64(3);
        advance(&mut fleet, &mut rng, &ctx, &TickSettings { heartbeat_probability: 1.0 });
        assert_eq!(fleet.relay(1, 1).unwrap().time_on(), "01:00:00");
        assert_eq!(fleet.concentrator(1).unwrap().details().last_readings, ctx.now);
    }
}
