//! power.rs — Electrical model of a luminaire
//!
//! `compute_power` is a pure function of the relay's switching state and its
//! voltage, current, power factor and line loss. Running it twice gives the
//! same result, which is what lets both commands and ticks call it freely.

use serde::Deserialize;

use crate::clock::SimContext;
use crate::error::{FleetError, TickError};
use crate::fleet::{Electrical, Relay};

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Recompute the derived power figures of a relay.
pub fn compute_power(relay: &mut Relay) {
    compute(&mut relay.electrical, relay.is_on);
}

pub(crate) fn compute(e: &mut Electrical, is_on: bool) {
    if !is_on {
        e.apparent_power = 0.0;
        e.active_power = 0.0;
        e.reactive_power = 0.0;
        e.total_power = 0.0;
        return;
    }

    let apparent = e.voltage * e.current;
    let active = apparent * e.power_factor;
    let reactive = apparent * (1.0 - e.power_factor * e.power_factor).max(0.0).sqrt();

    e.apparent_power = round2(apparent);
    e.active_power = round2(active);
    e.reactive_power = round2(reactive);
    e.total_power = round2(active + e.line_loss_w);
}

/// Accumulate consumed energy (kWh) over `dt_hours` of simulated time.
pub fn accrue_energy(relay: &mut Relay, dt_hours: f64) {
    let active = relay.electrical.active_power;
    if relay.is_on && active > 0.0 && dt_hours > 0.0 {
        relay.electrical.active_energy += active / 1000.0 * dt_hours;
    }
}

/// Reject readings the power model cannot work with.
pub fn check_readings(relay: &Relay) -> Result<(), TickError> {
    let e = &relay.electrical;
    let fields = [
        ("voltage", e.voltage),
        ("current", e.current),
        ("power factor", e.power_factor),
        ("active energy", e.active_energy),
        ("line loss", e.line_loss_w),
    ];
    if let Some(&(field, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
        return Err(TickError::NonFiniteReading {
            concentrator_id: relay.id_concentrator,
            relay_id: relay.id_relay,
            field,
        });
    }
    if !(0.0..=1.0).contains(&e.power_factor) {
        return Err(TickError::PowerFactorOutOfRange {
            concentrator_id: relay.id_concentrator,
            relay_id: relay.id_relay,
            value: e.power_factor,
        });
    }
    Ok(())
}

// ── Manual electrical update ──────────────────────────────────────────────────

/// Highest supply voltage an override may set, in volts.
pub const MAX_VOLTAGE: f64 = 1_000.0;
/// Highest line current an override may set, in amperes.
pub const MAX_CURRENT: f64 = 100.0;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectricalUpdate {
    #[serde(default)]
    pub voltage: Option<f64>,
    #[serde(default)]
    pub current: Option<f64>,
    #[serde(default)]
    pub power_factor: Option<f64>,
    #[serde(default)]
    pub is_on: Option<bool>,
}

impl ElectricalUpdate {
    fn validate(&self) -> Result<(), FleetError> {
        if let Some(v) = self.voltage {
            if !v.is_finite() || v <= 0.0 || v > MAX_VOLTAGE {
                return Err(FleetError::Validation(format!(
                    "voltage must be within (0, {MAX_VOLTAGE}] V, got {v}"
                )));
            }
        }
        if let Some(i) = self.current {
            if !i.is_finite() || !(0.0..=MAX_CURRENT).contains(&i) {
                return Err(FleetError::Validation(format!(
                    "current must be within [0, {MAX_CURRENT}] A, got {i}"
                )));
            }
        }
        if let Some(pf) = self.power_factor {
            if !pf.is_finite() || !(0.0..=1.0).contains(&pf) {
                return Err(FleetError::Validation(format!("power factor must be within [0, 1], got {pf}")));
            }
        }
        Ok(())
    }
}

/// Apply a manual reading override and re-run the power model.
/// Nothing is written unless every supplied value is valid.
pub fn update_electrical(
    relay: &mut Relay,
    update: &ElectricalUpdate,
    ctx: &SimContext,
) -> Result<(), FleetError> {
    update.validate()?;

    if let Some(v) = update.voltage {
        relay.electrical.voltage = v;
    }
    if let Some(i) = update.current {
        relay.electrical.current = i;
    }
    if let Some(pf) = update.power_factor {
        relay.electrical.power_factor = pf;
    }
    match update.is_on {
        Some(true) if !relay.is_on => relay.switch_on(ctx),
        Some(false) if relay.is_on => relay.switch_off(ctx),
        _ => {}
    }

    compute_power(relay);
    Ok(())
}
