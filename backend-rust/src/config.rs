//! config.rs — Service configuration loaded from `config.toml`
//!
//! The checked-in `config.toml` is compiled in and used whenever the
//! configured file cannot be read. Command-line flags override file values.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use fleet_simulator::{LocalClock, TickSettings};
use tracing::warn;

const BUILTIN_CONFIG: &str = include_str!("../config.toml");

/// Time programs fire on the minute, so a tick must not span more than one.
pub const MAX_TICK_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct FullConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub topology: TopologyConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3001 }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub tick_interval_ms: u64,
    pub speed: f64,
    pub utc_offset_hours: i32,
    pub system_clock: bool,
    pub heartbeat_probability: f64,
    pub log_every_ticks: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 5000,
            speed: 1.0,
            utc_offset_hours: -3,
            system_clock: false,
            heartbeat_probability: 0.1,
            log_every_ticks: 12,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub path: PathBuf,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("assets/topology.json") }
    }
}

impl FullConfig {
    /// Read `path`, falling back to the built-in defaults when it is missing.
    pub fn load(path: &str) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("config {path} not readable ({e}), using built-in defaults");
                BUILTIN_CONFIG.to_string()
            }
        };
        let cfg = Self::parse(&raw).with_context(|| format!("invalid configuration in {path}"))?;
        Ok(cfg)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(raw)?;
        cfg.simulation.validate()?;
        Ok(cfg)
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_TICK_INTERVAL_MS).contains(&self.tick_interval_ms) {
            bail!(
                "simulation.tick_interval_ms must be within 1..={MAX_TICK_INTERVAL_MS}, got {}",
                self.tick_interval_ms
            );
        }
        if !self.speed.is_finite() || self.speed <= 0.0 {
            bail!("simulation.speed must be a positive number, got {}", self.speed);
        }
        self.tick_elapsed()?;
        if !(0.0..=1.0).contains(&self.heartbeat_probability) {
            bail!(
                "simulation.heartbeat_probability must be within [0, 1], got {}",
                self.heartbeat_probability
            );
        }
        Ok(())
    }

    pub fn clock(&self) -> Result<LocalClock> {
        if self.system_clock {
            return Ok(LocalClock::System);
        }
        LocalClock::from_utc_offset_hours(self.utc_offset_hours)
            .with_context(|| format!("utc_offset_hours {} is out of range", self.utc_offset_hours))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Simulated time covered by one tick.
    pub fn tick_elapsed(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.tick_interval().as_secs_f64() * self.speed).with_context(|| {
            format!(
                "simulation.speed {} makes a {}ms tick too long to represent",
                self.speed, self.tick_interval_ms
            )
        })
    }

    pub fn tick_settings(&self) -> TickSettings {
        TickSettings { heartbeat_probability: self.heartbeat_probability }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_config_parses() {
        let cfg = FullConfig::parse(BUILTIN_CONFIG).unwrap();
        assert_eq!(cfg.server.port, 3001);
        assert_eq!(cfg.simulation.tick_interval_ms, 5000);
        assert_eq!(cfg.simulation.clock().unwrap(), LocalClock::from_utc_offset_hours(-3).unwrap());
    }

    #[test]
    fn missing_sections_take_defaults() {
        let cfg = FullConfig::parse("[simulation]\nspeed = 60.0\n").unwrap();
        assert_eq!(cfg.server.port, 3001);
        assert_eq!(cfg.simulation.tick_elapsed().unwrap(), Duration::from_secs(300));
        assert_eq!(cfg.topology.path, PathBuf::from("assets/topology.json"));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(FullConfig::parse("[simulation]\nspeed = 0.0\n").is_err());
        assert!(FullConfig::parse("[simulation]\nheartbeat_probability = 2.0\n").is_err());
        let cfg = FullConfig::parse("[simulation]\nutc_offset_hours = 99\n").unwrap();
        assert!(cfg.simulation.clock().is_err());
    }

    #[test]
    fn unrepresentable_tick_span_is_rejected() {
        assert!(FullConfig::parse("[simulation]\nspeed = 1e300\n").is_err());

        let runaway = SimulationConfig { speed: 1e300, ..Default::default() };
        assert!(runaway.tick_elapsed().is_err());
        assert!(runaway.validate().is_err());
        let hourly = SimulationConfig { speed: 3600.0, ..Default::default() };
        assert_eq!(hourly.tick_elapsed().unwrap(), Duration::from_secs(5 * 3600));
    }

    #[test]
    fn tick_interval_is_capped_at_one_minute() {
        assert!(FullConfig::parse("[simulation]\ntick_interval_ms = 0\n").is_err());
        assert!(FullConfig::parse("[simulation]\ntick_interval_ms = 60001\n").is_err());
        let cfg = FullConfig::parse("[simulation]\ntick_interval_ms = 60000\n").unwrap();
        assert_eq!(cfg.simulation.tick_interval(), Duration::from_secs(60));
    }

    #[test]
    fn bundled_topology_is_valid() {
        let topology = fleet_simulator::topology::parse_topology(include_str!("../assets/topology.json")).unwrap();
        assert_eq!(topology.concentrators.len(), 4);
        assert_eq!(topology.relay_count(), 48);
    }

    #[test]
    fn file_on_disk_wins_over_builtin() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 8088\n[simulation]\nsystem_clock = true").unwrap();
        let cfg = FullConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.port, 8088);
        assert_eq!(cfg.simulation.clock().unwrap(), LocalClock::System);
    }
}
