//! POI JSON loader. Grounded in
//! `original_source/backend/layer1/include/POIRegistry.hh`'s load routine;
//! key-variant tolerance and the `CHARGER` synonym come straight from the
//! spec's external-interface section.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::errors::POIError;
use crate::geometry::Coordinates;
use crate::mapping::poi::{Poi, PoiKind, PoiRegistry};

#[derive(Debug, Deserialize)]
struct RawPoi {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    x: i32,
    y: i32,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

/// Accepts any of the `poi` / `pois` / `points_of_interest` array keys,
/// since producers disagree on the exact name.
fn find_poi_array(root: &Value) -> Result<&Vec<Value>, POIError> {
    for key in ["poi", "pois", "points_of_interest"] {
        if let Some(Value::Array(items)) = root.get(key) {
            return Ok(items);
        }
    }
    Err(POIError::MissingArray)
}

/// Parses POI JSON into a [`PoiRegistry`]. Duplicate ids are skipped with a
/// warning; the caller still gets every other entry.
pub fn load_poi_json(contents: &str) -> Result<PoiRegistry, POIError> {
    let root: Value = serde_json::from_str(contents)?;
    let items = find_poi_array(&root)?;

    let mut registry = PoiRegistry::new();
    for item in items {
        let raw: RawPoi = serde_json::from_value(item.clone())?;
        let Some(kind) = PoiKind::parse(&raw.kind) else {
            warn!(poi_id = %raw.id, kind = %raw.kind, "unknown POI type, skipping");
            continue;
        };
        let poi = Poi {
            id: raw.id.clone(),
            kind,
            world_coords: Coordinates::new(raw.x, raw.y),
            nearest_node_id: None,
            is_active: raw.active,
        };
        if let Err(duplicate_id) = registry.insert(poi) {
            warn!(poi_id = %duplicate_id, "duplicate POI id, entry skipped");
        }
    }

    Ok(registry)
}

pub fn load_poi_file(path: impl AsRef<std::path::Path>) -> Result<PoiRegistry, POIError> {
    let contents = std::fs::read_to_string(path)?;
    load_poi_json(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_poi_key_variant() {
        let json = r#"{"poi": [{"id": "P1", "type": "PICKUP", "x": 1, "y": 2}]}"#;
        let registry = load_poi_json(json).unwrap();
        assert_eq!(registry.len(), 1);
        let poi = registry.get("P1").unwrap();
        assert_eq!(poi.kind, PoiKind::Pickup);
        assert!(poi.is_active);
    }

    #[test]
    fn loads_pois_and_points_of_interest_key_variants() {
        let a = load_poi_json(r#"{"pois": [{"id": "A", "type": "DROPOFF", "x": 0, "y": 0}]}"#)
            .unwrap();
        assert_eq!(a.len(), 1);
        let b = load_poi_json(
            r#"{"points_of_interest": [{"id": "B", "type": "DROPOFF", "x": 0, "y": 0}]}"#,
        )
        .unwrap();
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn legacy_charger_type_resolves_to_charging() {
        let json = r#"{"poi": [{"id": "C1", "type": "CHARGER", "x": 0, "y": 0}]}"#;
        let registry = load_poi_json(json).unwrap();
        assert_eq!(registry.get("C1").unwrap().kind, PoiKind::Charging);
    }

    #[test]
    fn missing_active_defaults_true() {
        let json = r#"{"poi": [{"id": "P1", "type": "PICKUP", "x": 1, "y": 2}]}"#;
        let registry = load_poi_json(json).unwrap();
        assert!(registry.get("P1").unwrap().is_active);
    }

    #[test]
    fn duplicate_id_is_skipped_others_still_load() {
        let json = r#"{"poi": [
            {"id": "P1", "type": "PICKUP", "x": 0, "y": 0},
            {"id": "P1", "type": "DROPOFF", "x": 1, "y": 1},
            {"id": "P2", "type": "CHARGING", "x": 2, "y": 2}
        ]}"#;
        let registry = load_poi_json(json).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("P2").is_some());
    }

    #[test]
    fn type_is_case_insensitive() {
        let json = r#"{"poi": [{"id": "P1", "type": "pickup", "x": 0, "y": 0}]}"#;
        let registry = load_poi_json(json).unwrap();
        assert_eq!(registry.get("P1").unwrap().kind, PoiKind::Pickup);
    }
}
