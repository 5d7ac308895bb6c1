//! POIRegistry (C3): named POIs resolved to graph nodes, safety-validated
//!. Grounded in
//! `original_source/backend/layer1/include/POIRegistry.hh`.

use std::collections::HashMap;

use tracing::warn;

use crate::geometry::Coordinates;
use crate::mapping::grid::Grid;
use crate::mapping::navgraph::NavGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoiKind {
    Pickup,
    Dropoff,
    Charging,
}

impl PoiKind {
    /// Case-insensitive; the legacy synonym `CHARGER` maps to `CHARGING`
    ///.
    pub fn parse(s: &str) -> Option<PoiKind> {
        match s.to_ascii_uppercase().as_str() {
            "PICKUP" => Some(PoiKind::Pickup),
            "DROPOFF" => Some(PoiKind::Dropoff),
            "CHARGING" | "CHARGER" => Some(PoiKind::Charging),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Poi {
    pub id: String,
    pub kind: PoiKind,
    pub world_coords: Coordinates,
    pub nearest_node_id: Option<usize>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PoiRegistry {
    pois: Vec<Poi>,
    by_id: HashMap<String, usize>,
}

impl PoiRegistry {
    pub fn new() -> Self {
        PoiRegistry::default()
    }

    /// Inserts a POI; a duplicate id is rejected (the entry is skipped, the
    /// registry is unchanged) while the caller can continue processing the
    /// rest of a batch.
    pub fn insert(&mut self, poi: Poi) -> Result<(), String> {
        if self.by_id.contains_key(&poi.id) {
            return Err(poi.id);
        }
        let idx = self.pois.len();
        self.by_id.insert(poi.id.clone(), idx);
        self.pois.push(poi);
        Ok(())
    }

    /// Validates every POI's world coordinate against the safety grid and
    /// resolves it to the nearest NavGraph node. Unsafe POIs are disabled
    /// rather than rejected.
    pub fn validate_and_map(&mut self, nav: &NavGraph, safety: &Grid, max_distance: Option<f64>) {
        for poi in &mut self.pois {
            if !safety.is_accessible_safe(poi.world_coords) {
                warn!(poi_id = %poi.id, "POI is not safely accessible; disabling");
                poi.is_active = false;
                poi.nearest_node_id = None;
                continue;
            }

            let nearest = nav.nearest_node(poi.world_coords);
            match nearest {
                Some(node_id) => {
                    if let Some(max_d) = max_distance {
                        let node_coord = nav.nodes[node_id].centroid;
                        if poi.world_coords.euclidean(&node_coord) > max_d {
                            warn!(poi_id = %poi.id, "nearest node exceeds max_distance; disabling");
                            poi.is_active = false;
                            poi.nearest_node_id = None;
                            continue;
                        }
                    }
                    poi.nearest_node_id = Some(node_id);
                }
                None => {
                    poi.is_active = false;
                    poi.nearest_node_id = None;
                }
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Poi> {
        self.by_id.get(id).map(|&i| &self.pois[i])
    }

    pub fn node_for_poi(&self, id: &str) -> Option<usize> {
        self.get(id).and_then(|p| p.nearest_node_id)
    }

    pub fn pois_at_node(&self, node_id: usize) -> Vec<&Poi> {
        self.pois
            .iter()
            .filter(|p| p.nearest_node_id == Some(node_id))
            .collect()
    }

    /// Sorted, deduplicated node ids for the given POI kind.
    pub fn nodes_of_type(&self, kind: PoiKind, active_only: bool) -> Vec<usize> {
        let mut nodes: Vec<usize> = self
            .pois
            .iter()
            .filter(|p| p.kind == kind && (!active_only || p.is_active))
            .filter_map(|p| p.nearest_node_id)
            .collect();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    pub fn iter(&self) -> impl Iterator<Item = &Poi> {
        self.pois.iter()
    }

    pub fn len(&self) -> usize {
        self.pois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pois.is_empty()
    }
}
