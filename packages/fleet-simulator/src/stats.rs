//! stats.rs — Fleet-wide aggregates and on-demand audits

use lighting_types::COMMAND_NAMES;
use serde::Serialize;
use tracing::info;

use crate::registry::DeviceRegistry;
use crate::tick::{self, ConsistencyReport};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorCounts {
    pub dimmer: usize,
    pub light_sensor: usize,
    pub light_sensor_enabled: usize,
    pub gps: usize,
    pub temperature: usize,
    pub humidity: usize,
    pub motion: usize,
}

/// Means over the relays that carry each reading; `None` when none do.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorAverages {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub motion_level: Option<f64>,
    pub ambient_light: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorStatistics {
    pub total_relays: usize,
    pub sensors_present: SensorCounts,
    pub average_values: SensorAverages,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub total_concentrators: usize,
    pub total_relays: usize,
    pub online_concentrators: usize,
    pub relays_on: usize,
    pub available_commands: Vec<&'static str>,
}

#[derive(Default)]
struct Mean {
    sum: f64,
    n: usize,
}

impl Mean {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.n += 1;
    }

    fn value(&self) -> Option<f64> {
        (self.n > 0).then(|| (self.sum / self.n as f64 * 10.0).round() / 10.0)
    }
}

pub fn sensor_statistics(registry: &DeviceRegistry) -> SensorStatistics {
    let mut counts = SensorCounts::default();
    let (mut temperature, mut humidity, mut motion, mut light) =
        (Mean::default(), Mean::default(), Mean::default(), Mean::default());
    let mut total = 0;

    for relay in registry.relays() {
        total += 1;
        let caps = relay.capabilities();
        counts.dimmer += usize::from(caps.dimmer_present);
        counts.light_sensor += usize::from(caps.light_sensor_present);
        counts.light_sensor_enabled += usize::from(relay.is_light_sensor_enabled);
        counts.gps += usize::from(caps.gps_present);
        counts.temperature += usize::from(caps.temperature_sensor_present);
        counts.humidity += usize::from(caps.humidity_sensor_present);
        counts.motion += usize::from(caps.motion_sensor_present);

        if let Some(t) = relay.temperature_c {
            temperature.push(t);
        }
        if let Some(h) = relay.humidity_pct {
            humidity.push(f64::from(h));
        }
        if let Some(m) = &relay.motion {
            motion.push(f64::from(m.level));
        }
        light.push(f64::from(relay.ambient_light));
    }

    SensorStatistics {
        total_relays: total,
        sensors_present: counts,
        average_values: SensorAverages {
            temperature: temperature.value(),
            humidity: humidity.value(),
            motion_level: motion.value(),
            ambient_light: light.value(),
        },
    }
}

/// Run the relay consistency repair across the whole fleet.
pub fn audit_consistency(registry: &mut DeviceRegistry, is_night: bool) -> ConsistencyReport {
    let mut report = ConsistencyReport::default();
    for relay in registry.relays_mut() {
        tick::repair(relay, is_night, &mut report);
    }
    info!(
        "🔍 Consistency audit: {} relays checked, {} dimmer / {} time-of-day issues, {} corrections",
        report.relays_checked, report.invalid_dimmer_status, report.invalid_time_status, report.corrected
    );
    report
}

pub fn system_status(registry: &DeviceRegistry) -> SystemStatus {
    SystemStatus {
        total_concentrators: registry.concentrator_count(),
        total_relays: registry.relay_count(),
        online_concentrators: registry
            .concentrators()
            .filter(|c| c.details().status.is_online())
            .count(),
        relays_on: registry.relays().filter(|r| r.is_on).count(),
        available_commands: COMMAND_NAMES.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::{day, night};
    use crate::registry::test_support::registry;
    use lighting_types::RelayStatus;

    #[test]
    fn counts_cover_every_relay() {
        let fleet = registry(&night(), 3, 10);
        let stats = sensor_statistics(&fleet);
        assert_eq!(stats.total_relays, 30);
        let expected_dimmers = fleet.relays().filter(|r| r.capabilities().dimmer_present).count();
        assert_eq!(stats.sensors_present.dimmer, expected_dimmers);
        assert!(stats.average_values.ambient_light.unwrap() < 100.0);
    }

    #[test]
    fn averages_only_count_present_readings() {
        let ctx = night();
        let mut fleet = registry(&ctx, 1, 2);
        for relay in fleet.relays_mut() {
            relay.temperature_c = None;
        }
        fleet.locate_mut(1, 1).unwrap().temperature_c = Some(20.0);
        let stats = sensor_statistics(&fleet);
        assert_eq!(stats.average_values.temperature, Some(20.0));
    }

    #[test]
    fn audit_repairs_daytime_anomalies() {
        let mut fleet = registry(&night(), 1, 3);
        fleet.locate_mut(1, 1).unwrap().status = RelayStatus::OffDuringNight;
        fleet.locate_mut(1, 2).unwrap().status = RelayStatus::OffDuringNight;

        let report = audit_consistency(&mut fleet, day().is_night);
        assert_eq!(report.relays_checked, 3);
        assert!(report.invalid_time_status >= 2);
        assert!(fleet.relays().all(|r| r.status != RelayStatus::OffDuringNight));

        let again = audit_consistency(&mut fleet, false);
        assert_eq!(again.corrected, 0);
    }

    #[test]
    fn status_lists_commands() {
        let fleet = registry(&night(), 2, 2);
        let status = system_status(&fleet);
        assert_eq!(status.total_concentrators, 2);
        assert_eq!(status.total_relays, 4);
        assert!(status.available_commands.contains(&"setup_time_program"));
    }
}
