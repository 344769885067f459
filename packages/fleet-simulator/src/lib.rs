//! # fleet-simulator
//!
//! In-memory simulation engine for a street-lighting fleet: concentrators
//! (field gateways) each owning a set of relays (luminaire controllers).
//!
//! ## Pipeline
//!
//! ```text
//! topology.json ─▶ topology::load_topology ─▶ DeviceRegistry::load
//!                                                   │
//!            ┌──────────────────────────────────────┤
//!            ▼                                      ▼
//!   tick::advance (periodic)           command::execute (on demand)
//!            │                                      │
//!            └──────▶ power::compute_power ◀────────┘
//! ```
//!
//! The engine is synchronous and owns no locks; the embedding service
//! decides how ticks and commands are serialized.

pub mod clock;
pub mod command;
pub mod error;
pub mod fleet;
pub mod power;
pub mod registry;
pub mod stats;
pub mod telemetry;
pub mod tick;
pub mod topology;

pub use clock::{LocalClock, SimContext};
pub use command::{execute, execute_command, Command, CommandOutcome};
pub use error::{FleetError, TickError, TopologyError};
pub use fleet::{
    Capabilities, Capability, Concentrator, ConcentratorDetails, FaultCode, Relay, TimeProgram,
};
pub use power::{compute_power, ElectricalUpdate};
pub use registry::DeviceRegistry;
pub use stats::{audit_consistency, sensor_statistics, system_status, SensorStatistics, SystemStatus};
pub use tick::{advance, ConsistencyReport, TickReport, TickSettings};
pub use topology::load_topology;
