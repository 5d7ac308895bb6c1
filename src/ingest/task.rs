//! Task JSON loader. Resolves string POI ids via a
//! [`PoiRegistry`]; the legacy variant carries node ids directly. Grounded
//! in `original_source/backend/layer2/include/Task.hh`'s two constructors.

use serde::Deserialize;
use tracing::warn;

use crate::errors::POIError;
use crate::mapping::poi::PoiRegistry;
use crate::planning::task::{Task, TaskId};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEndpoint {
    Named(String),
    NodeId(usize),
}

#[derive(Debug, Deserialize)]
struct RawTask {
    id: u64,
    source: RawEndpoint,
    destination: RawEndpoint,
}

#[derive(Debug, Deserialize)]
struct RawTaskFile {
    tasks: Vec<RawTask>,
}

/// Resolves each task's `source`/`destination`. String ids go through
/// `registry`; numeric ids (the legacy variant) are taken as node ids
/// directly. Tasks with an unresolved string id are dropped with a
/// warning, not rejected outright.
pub fn load_task_json(contents: &str, registry: &PoiRegistry) -> Result<Vec<Task>, POIError> {
    let raw: RawTaskFile = serde_json::from_str(contents)?;
    let mut tasks = Vec::with_capacity(raw.tasks.len());

    for raw_task in raw.tasks {
        let resolved = (
            resolve_endpoint(&raw_task.source, registry),
            resolve_endpoint(&raw_task.destination, registry),
        );
        match resolved {
            (Some((source_node, source_id_str)), Some((dest_node, dest_id_str))) => {
                tasks.push(Task {
                    id: TaskId(raw_task.id),
                    source_node,
                    dest_node,
                    source_id_str,
                    dest_id_str,
                });
            }
            _ => {
                warn!(task_id = raw_task.id, "unresolved POI id, task dropped");
            }
        }
    }

    Ok(tasks)
}

fn resolve_endpoint(endpoint: &RawEndpoint, registry: &PoiRegistry) -> Option<(usize, Option<String>)> {
    match endpoint {
        RawEndpoint::NodeId(node) => Some((*node, None)),
        RawEndpoint::Named(id) => registry.node_for_poi(id).map(|node| (node, Some(id.clone()))),
    }
}

pub fn load_task_file(
    path: impl AsRef<std::path::Path>,
    registry: &PoiRegistry,
) -> Result<Vec<Task>, POIError> {
    let contents = std::fs::read_to_string(path)?;
    load_task_json(&contents, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Coordinates;
    use crate::mapping::grid::Grid;
    use crate::mapping::navgraph::NavGraph;
    use crate::mapping::poi::{Poi, PoiKind};
    use crate::geometry::Resolution;

    fn registry_with_two_pois() -> PoiRegistry {
        let mut text = String::from("5 5\n");
        for _ in 0..5 {
            text.push_str(".....\n");
        }
        let grid = Grid::load_from_str(&text, Resolution::Decimeters, 0.0).unwrap();
        let nav = NavGraph::from_grid(&grid).unwrap();

        let mut registry = PoiRegistry::new();
        registry
            .insert(Poi {
                id: "P1".into(),
                kind: PoiKind::Pickup,
                world_coords: Coordinates::new(0, 0),
                nearest_node_id: None,
                is_active: true,
            })
            .unwrap();
        registry
            .insert(Poi {
                id: "P2".into(),
                kind: PoiKind::Dropoff,
                world_coords: Coordinates::new(4, 4),
                nearest_node_id: None,
                is_active: true,
            })
            .unwrap();
        registry.validate_and_map(&nav, &grid, None);
        registry
    }

    #[test]
    fn resolves_string_ids_through_registry() {
        let registry = registry_with_two_pois();
        let json = r#"{"tasks": [{"id": 1, "source": "P1", "destination": "P2"}]}"#;
        let tasks = load_task_json(json, &registry).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].source_id_str.as_deref(), Some("P1"));
    }

    #[test]
    fn legacy_numeric_variant_uses_node_ids_directly() {
        let registry = registry_with_two_pois();
        let json = r#"{"tasks": [{"id": 2, "source": 0, "destination": 1}]}"#;
        let tasks = load_task_json(json, &registry).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].source_node, 0);
        assert_eq!(tasks[0].dest_node, 1);
        assert!(tasks[0].source_id_str.is_none());
    }

    #[test]
    fn unresolved_ids_are_dropped_not_errors() {
        let registry = registry_with_two_pois();
        let json = r#"{"tasks": [
            {"id": 1, "source": "P1", "destination": "P2"},
            {"id": 2, "source": "UNKNOWN", "destination": "P2"}
        ]}"#;
        let tasks = load_task_json(json, &registry).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, TaskId(1));
    }
}
