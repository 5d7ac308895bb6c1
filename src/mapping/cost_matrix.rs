//! CostMatrix (C4): all-pairs POI travel costs via Dijkstra over NavGraph.
//! Grounded in
//! `original_source/backend/layer2/include/CostMatrixProvider.hh`.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use rayon::prelude::*;

use crate::mapping::navgraph::NavGraph;

#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapEntry {
    cost: f64,
    node: usize,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap by cost; ties broken toward the lower node id.
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Single-source Dijkstra over the full NavGraph.
fn dijkstra(nav: &NavGraph, source: usize) -> HashMap<usize, f64> {
    let mut dist: HashMap<usize, f64> = HashMap::new();
    let mut heap = BinaryHeap::new();
    dist.insert(source, 0.0);
    heap.push(HeapEntry {
        cost: 0.0,
        node: source,
    });

    while let Some(HeapEntry { cost, node }) = heap.pop() {
        if cost > *dist.get(&node).unwrap_or(&f64::INFINITY) {
            continue;
        }
        for edge in &nav.adj[node] {
            let next_cost = cost + edge.cost;
            if next_cost < *dist.get(&edge.target_id).unwrap_or(&f64::INFINITY) {
                dist.insert(edge.target_id, next_cost);
                heap.push(HeapEntry {
                    cost: next_cost,
                    node: edge.target_id,
                });
            }
        }
    }

    dist
}

#[derive(Debug, Clone, Default)]
pub struct CostMatrix {
    costs: HashMap<(usize, usize), f64>,
}

impl CostMatrix {
    pub fn new() -> Self {
        CostMatrix::default()
    }

    /// For each source in `node_ids`, runs Dijkstra over the full graph and
    /// records the cost to every other member of `node_ids` reachable from
    /// it. Sources are processed in parallel (rayon), mirroring the
    /// teacher's use of `par_iter` for independent per-candidate work.
    pub fn precompute_for(&mut self, nav: &NavGraph, node_ids: &[usize]) {
        let rows: Vec<Vec<((usize, usize), f64)>> = node_ids
            .par_iter()
            .map(|&source| {
                let dist = dijkstra(nav, source);
                node_ids
                    .iter()
                    .filter_map(|&target| dist.get(&target).map(|&c| ((source, target), c)))
                    .collect::<Vec<_>>()
            })
            .collect();

        for row in rows {
            for (key, cost) in row {
                self.costs.insert(key, cost);
            }
        }
    }

    /// Single-source Dijkstra at runtime, e.g. for a robot starting at a
    /// non-POI node.
    pub fn add_row_for(&mut self, nav: &NavGraph, src: usize, targets: &[usize]) {
        let dist = dijkstra(nav, src);
        for &target in targets {
            if let Some(&cost) = dist.get(&target) {
                self.costs.insert((src, target), cost);
                self.costs.insert((target, src), cost);
            }
        }
    }

    /// Returns `+inf` for unreachable or unrecorded pairs.
    pub fn get_cost(&self, from: usize, to: usize) -> f64 {
        if from == to {
            return 0.0;
        }
        *self.costs.get(&(from, to)).unwrap_or(&f64::INFINITY)
    }

    pub fn contains(&self, from: usize, to: usize) -> bool {
        from == to || self.costs.contains_key(&(from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::navgraph::{Edge, Node};
    use crate::geometry::Coordinates;

    fn chain_graph() -> NavGraph {
        // 0 -(2)- 1 -(3)- 2
        let nodes = (0..3)
            .map(|id| Node {
                id,
                centroid: Coordinates::new(id as i32, 0),
            })
            .collect();
        let adj = vec![
            vec![Edge {
                target_id: 1,
                cost: 2.0,
            }],
            vec![
                Edge {
                    target_id: 0,
                    cost: 2.0,
                },
                Edge {
                    target_id: 2,
                    cost: 3.0,
                },
            ],
            vec![Edge {
                target_id: 1,
                cost: 3.0,
            }],
        ];
        NavGraph { nodes, adj }
    }

    #[test]
    fn cost_matrix_is_symmetric() {
        let nav = chain_graph();
        let mut cm = CostMatrix::new();
        cm.precompute_for(&nav, &[0, 1, 2]);
        assert_eq!(cm.get_cost(0, 2), 5.0);
        assert_eq!(cm.get_cost(2, 0), 5.0);
        assert_eq!(cm.get_cost(0, 2), cm.get_cost(2, 0));
    }

    #[test]
    fn unreachable_pair_is_infinite() {
        let nodes = vec![
            Node {
                id: 0,
                centroid: Coordinates::new(0, 0),
            },
            Node {
                id: 1,
                centroid: Coordinates::new(1, 0),
            },
        ];
        let nav = NavGraph {
            nodes,
            adj: vec![Vec::new(), Vec::new()],
        };
        let mut cm = CostMatrix::new();
        cm.precompute_for(&nav, &[0, 1]);
        assert!(cm.get_cost(0, 1).is_infinite());
    }

    #[test]
    fn add_row_for_is_symmetric_with_existing_rows() {
        let nav = chain_graph();
        let mut cm = CostMatrix::new();
        cm.precompute_for(&nav, &[1, 2]);
        cm.add_row_for(&nav, 0, &[1, 2]);
        assert_eq!(cm.get_cost(0, 2), cm.get_cost(2, 0));
    }
}
