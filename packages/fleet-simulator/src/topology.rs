//! topology.rs — Reading and validating the relay placement file

use std::collections::HashSet;
use std::path::Path;

use lighting_types::Topology;
use tracing::debug;

use crate::error::TopologyError;

pub fn load_topology(path: &Path) -> Result<Topology, TopologyError> {
    let raw = std::fs::read_to_string(path).map_err(|source| TopologyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let topology = parse_topology(&raw)?;
    debug!(
        "topology {}: {} concentrators, {} relays",
        path.display(),
        topology.concentrators.len(),
        topology.relay_count()
    );
    Ok(topology)
}

pub fn parse_topology(json: &str) -> Result<Topology, TopologyError> {
    let topology: Topology = serde_json::from_str(json)?;
    validate(&topology)?;
    Ok(topology)
}

fn check_point(entity: impl FnOnce() -> String, latitude: f64, longitude: f64) -> Result<(), TopologyError> {
    let valid = latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude);
    if valid {
        Ok(())
    } else {
        Err(TopologyError::InvalidCoordinate { entity: entity(), latitude, longitude })
    }
}

/// Non-empty, unique ids, coordinates on the globe.
pub fn validate(topology: &Topology) -> Result<(), TopologyError> {
    if topology.concentrators.is_empty() {
        return Err(TopologyError::Empty);
    }

    let mut seen = HashSet::new();
    for c in &topology.concentrators {
        if !seen.insert(c.id) {
            return Err(TopologyError::DuplicateConcentrator(c.id));
        }
        check_point(|| format!("concentrator {}", c.id), c.point.latitude, c.point.longitude)?;

        let mut relays = HashSet::new();
        for r in &c.relays {
            if !relays.insert(r.id) {
                return Err(TopologyError::DuplicateRelay { concentrator_id: c.id, relay_id: r.id });
            }
            check_point(|| format!("relay {} of concentrator {}", r.id, c.id), r.latitude, r.longitude)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "concentrators": [
            { "id": 10, "point": { "latitude": -23.55, "longitude": -46.63 },
              "relays": [ { "id": 1, "latitude": -23.551, "longitude": -46.631 },
                          { "id": 2, "latitude": -23.552, "longitude": -46.632 } ] },
            { "id": 11, "point": { "latitude": -23.56, "longitude": -46.64 } }
        ]
    }"#;

    #[test]
    fn loads_topology_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let topology = load_topology(file.path()).unwrap();
        assert_eq!(topology.concentrators.len(), 2);
        assert_eq!(topology.relay_count(), 2);
        assert!(topology.concentrators[1].relays.is_empty());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_topology(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, TopologyError::Io { .. }));
    }

    #[test]
    fn garbage_is_parse_error() {
        assert!(matches!(parse_topology("{ not json"), Err(TopologyError::Parse(_))));
        assert!(matches!(parse_topology(r#"{"concentrators": []}"#), Err(TopologyError::Empty)));
    }

    #[test]
    fn duplicates_are_rejected() {
        let dup = r#"{"concentrators":[
            {"id":1,"point":{"latitude":0,"longitude":0}},
            {"id":1,"point":{"latitude":1,"longitude":1}}]}"#;
        assert!(matches!(parse_topology(dup), Err(TopologyError::DuplicateConcentrator(1))));

        let dup_relay = r#"{"concentrators":[{"id":1,"point":{"latitude":0,"longitude":0},
            "relays":[{"id":5,"latitude":0,"longitude":0},{"id":5,"latitude":0,"longitude":0}]}]}"#;
        assert!(matches!(
            parse_topology(dup_relay),
            Err(TopologyError::DuplicateRelay { concentrator_id: 1, relay_id: 5 })
        ));
    }

    #[test]
    fn off_globe_coordinates_are_rejected() {
        let bad = r#"{"concentrators":[{"id":1,"point":{"latitude":123.0,"longitude":0}}]}"#;
        let err = parse_topology(bad).unwrap_err();
        assert!(err.to_string().contains("concentrator 1"));
    }
}
