//! error.rs — Error taxonomy of the fleet engine
//!
//! Every rejected operation is an expected outcome carried in a `Result`;
//! nothing in the engine panics on bad input, and a rejected command leaves
//! the fleet untouched.

use std::path::PathBuf;

use lighting_types::{ConcentratorId, RelayId};
use thiserror::Error;

use crate::fleet::Capability;

pub type Result<T> = std::result::Result<T, FleetError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FleetError {
    #[error("concentrator {0} not found")]
    ConcentratorNotFound(ConcentratorId),
    #[error("relay {relay_id} not found on concentrator {concentrator_id}")]
    RelayNotFound {
        concentrator_id: ConcentratorId,
        relay_id: RelayId,
    },
    /// Unknown command name or missing required parameters
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("relay {relay_id} on concentrator {concentrator_id} has no {capability}")]
    CapabilityViolation {
        concentrator_id: ConcentratorId,
        relay_id: RelayId,
        capability: Capability,
    },
    /// Malformed id, out-of-range percentage, unparsable time, ...
    #[error("validation failed: {0}")]
    Validation(String),
}

impl FleetError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ConcentratorNotFound(_) | Self::RelayNotFound { .. })
    }
}

/// Startup failures while reading the topology. Always fatal.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("cannot read topology file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed topology JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("topology contains no concentrators")]
    Empty,
    #[error("duplicate concentrator id {0}")]
    DuplicateConcentrator(ConcentratorId),
    #[error("duplicate relay id {relay_id} under concentrator {concentrator_id}")]
    DuplicateRelay {
        concentrator_id: ConcentratorId,
        relay_id: RelayId,
    },
    #[error("invalid coordinates ({latitude}, {longitude}) for {entity}")]
    InvalidCoordinate {
        entity: String,
        latitude: f64,
        longitude: f64,
    },
}

/// A single relay that could not be advanced during a tick.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TickError {
    #[error("relay {relay_id} on concentrator {concentrator_id}: non-finite {field} reading")]
    NonFiniteReading {
        concentrator_id: ConcentratorId,
        relay_id: RelayId,
        field: &'static str,
    },
    #[error("relay {relay_id} on concentrator {concentrator_id}: power factor {value} outside [0, 1]")]
    PowerFactorOutOfRange {
        concentrator_id: ConcentratorId,
        relay_id: RelayId,
        value: f64,
    },
}
