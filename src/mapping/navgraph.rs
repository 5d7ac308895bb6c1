//! NavGraph (C2): sparse nav graph built by rectangular decomposition of the
//! inflated grid. Grounded in
//! `original_source/optimality/01_layer_mapping/include/Graph.hh` and
//! `Graph.cc` — the planner graph, not the warehouse `Graph2`.

use std::collections::VecDeque;

use crate::errors::GraphError;
use crate::geometry::Coordinates;
use crate::mapping::grid::Grid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub target_id: usize,
    pub cost: f64,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: usize,
    pub centroid: Coordinates,
}

#[derive(Debug, Clone, Default)]
pub struct NavGraph {
    pub nodes: Vec<Node>,
    pub adj: Vec<Vec<Edge>>,
}

struct Rect {
    x0: usize,
    y0: usize,
    w: usize,
    h: usize,
}

impl Rect {
    fn centroid(&self) -> Coordinates {
        Coordinates::new(
            (self.x0 + self.w / 2) as i32,
            (self.y0 + self.h / 2) as i32,
        )
    }

    /// True iff this rectangle and `other` share a non-zero-length border.
    fn adjacent_to(&self, other: &Rect) -> bool {
        let self_right = self.x0 + self.w;
        let self_bottom = self.y0 + self.h;
        let other_right = other.x0 + other.w;
        let other_bottom = other.y0 + other.h;

        let horizontally_touching = self_right == other.x0 || other_right == self.x0;
        let vertically_overlapping = self.y0 < other_bottom && other.y0 < self_bottom;
        if horizontally_touching && vertically_overlapping {
            return true;
        }

        let vertically_touching = self_bottom == other.y0 || other_bottom == self.y0;
        let horizontally_overlapping = self.x0 < other_right && other.x0 < self_right;
        vertically_touching && horizontally_overlapping
    }
}

impl NavGraph {
    /// Scans the grid row-major, growing a maximal rectangle from every
    /// unconsumed free cell, then links rectangles that share a border.
    pub fn from_grid(grid: &Grid) -> Result<NavGraph, GraphError> {
        let width = grid.width();
        let height = grid.height();
        let mut consumed = vec![false; width * height];
        let is_free = |x: usize, y: usize| grid.is_accessible_safe(Coordinates::new(x as i32, y as i32));

        let mut rects = Vec::new();

        for y in 0..height {
            for x in 0..width {
                if consumed[y * width + x] || !is_free(x, y) {
                    continue;
                }

                // Expand width along this row until an obstacle or a consumed cell.
                let mut w = 0;
                while x + w < width && !consumed[y * width + x + w] && is_free(x + w, y) {
                    w += 1;
                }

                // Expand height as long as the entire row below is free and unconsumed.
                let mut h = 1;
                'grow: while y + h < height {
                    for dx in 0..w {
                        if consumed[(y + h) * width + x + dx] || !is_free(x + dx, y + h) {
                            break 'grow;
                        }
                    }
                    h += 1;
                }

                for dy in 0..h {
                    for dx in 0..w {
                        consumed[(y + dy) * width + x + dx] = true;
                    }
                }

                rects.push(Rect { x0: x, y0: y, w, h });
            }
        }

        if rects.is_empty() {
            return Err(GraphError::EmptyGrid);
        }

        let nodes: Vec<Node> = rects
            .iter()
            .enumerate()
            .map(|(id, r)| Node {
                id,
                centroid: r.centroid(),
            })
            .collect();

        let mut adj: Vec<Vec<Edge>> = vec![Vec::new(); rects.len()];
        for i in 0..rects.len() {
            for j in (i + 1)..rects.len() {
                if rects[i].adjacent_to(&rects[j]) {
                    let cost = nodes[i].centroid.euclidean(&nodes[j].centroid);
                    adj[i].push(Edge {
                        target_id: j,
                        cost,
                    });
                    adj[j].push(Edge {
                        target_id: i,
                        cost,
                    });
                }
            }
        }

        let mut graph = NavGraph { nodes, adj };
        graph.remove_orphans()?;
        Ok(graph)
    }

    /// BFS from node 0, remapping surviving node ids contiguously and
    /// rewriting every edge to use the new ids.
    fn remove_orphans(&mut self) -> Result<(), GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::EmptyGrid);
        }

        let mut reachable = vec![false; self.nodes.len()];
        let mut queue = VecDeque::new();
        reachable[0] = true;
        queue.push_back(0usize);
        while let Some(u) = queue.pop_front() {
            for edge in &self.adj[u] {
                if !reachable[edge.target_id] {
                    reachable[edge.target_id] = true;
                    queue.push_back(edge.target_id);
                }
            }
        }

        if reachable.iter().all(|&r| r) {
            return Ok(());
        }

        let mut remap = vec![usize::MAX; self.nodes.len()];
        let mut new_nodes = Vec::new();
        for (old_id, &keep) in reachable.iter().enumerate() {
            if keep {
                let new_id = new_nodes.len();
                remap[old_id] = new_id;
                new_nodes.push(Node {
                    id: new_id,
                    centroid: self.nodes[old_id].centroid,
                });
            }
        }

        let mut new_adj = vec![Vec::new(); new_nodes.len()];
        for (old_id, edges) in self.adj.iter().enumerate() {
            if remap[old_id] == usize::MAX {
                continue;
            }
            for e in edges {
                if remap[e.target_id] != usize::MAX {
                    new_adj[remap[old_id]].push(Edge {
                        target_id: remap[e.target_id],
                        cost: e.cost,
                    });
                }
            }
        }

        self.nodes = new_nodes;
        self.adj = new_adj;
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Linear scan of centroid distances; ties break toward the first
    /// strictly-smaller distance encountered.
    pub fn nearest_node(&self, coord: Coordinates) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for node in &self.nodes {
            let d = node.centroid.euclidean(&coord);
            match best {
                None => best = Some((node.id, d)),
                Some((_, best_d)) if d < best_d => best = Some((node.id, d)),
                _ => {}
            }
        }
        best.map(|(id, _)| id)
    }

    pub fn export_csv(&self) -> Result<(String, String), csv::Error> {
        let mut node_writer = csv::Writer::from_writer(Vec::new());
        node_writer.write_record(["id", "x", "y"])?;
        for node in &self.nodes {
            node_writer.write_record(&[
                node.id.to_string(),
                node.centroid.x.to_string(),
                node.centroid.y.to_string(),
            ])?;
        }
        let nodes_csv = String::from_utf8(node_writer.into_inner().unwrap()).unwrap();

        let mut edge_writer = csv::Writer::from_writer(Vec::new());
        edge_writer.write_record(["from", "to", "cost"])?;
        for (from, edges) in self.adj.iter().enumerate() {
            for edge in edges {
                edge_writer.write_record(&[
                    from.to_string(),
                    edge.target_id.to_string(),
                    edge.cost.to_string(),
                ])?;
            }
        }
        let edges_csv = String::from_utf8(edge_writer.into_inner().unwrap()).unwrap();

        Ok((nodes_csv, edges_csv))
    }

    pub fn import_csv(nodes_csv: &str, edges_csv: &str) -> Result<NavGraph, csv::Error> {
        let mut nodes = Vec::new();
        let mut reader = csv::Reader::from_reader(nodes_csv.as_bytes());
        for record in reader.records() {
            let record = record?;
            let id: usize = record[0].parse().unwrap();
            let x: i32 = record[1].parse().unwrap();
            let y: i32 = record[2].parse().unwrap();
            nodes.push(Node {
                id,
                centroid: Coordinates::new(x, y),
            });
        }

        let mut adj = vec![Vec::new(); nodes.len()];
        let mut reader = csv::Reader::from_reader(edges_csv.as_bytes());
        for record in reader.records() {
            let record = record?;
            let from: usize = record[0].parse().unwrap();
            let to: usize = record[1].parse().unwrap();
            let cost: f64 = record[2].parse().unwrap();
            adj[from].push(Edge {
                target_id: to,
                cost,
            });
        }

        Ok(NavGraph { nodes, adj })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Resolution;

    fn ten_by_ten_center_obstacle() -> Grid {
        let mut text = String::from("10 10\n");
        for y in 0..10 {
            for x in 0..10 {
                text.push(if x == 5 && y == 5 { '#' } else { '.' });
            }
            text.push('\n');
        }
        Grid::load_from_str(&text, Resolution::Decimeters, 0.0).unwrap()
    }

    #[test]
    fn navgraph_decomposes_single_obstacle_into_connected_rectangles() {
        let grid = ten_by_ten_center_obstacle();
        let graph = NavGraph::from_grid(&grid).unwrap();
        // A single interior obstacle cell splits the free region into a top
        // strip, a bottom-left block, a bottom-right block and a thin
        // leftover column flush against the obstacle's column — four
        // rectangles under this row-major maximal-rectangle scan.
        assert_eq!(graph.node_count(), 4);

        // BFS from node 0 reaches every other node.
        let mut reachable = vec![false; graph.node_count()];
        let mut queue = VecDeque::new();
        reachable[0] = true;
        queue.push_back(0usize);
        while let Some(u) = queue.pop_front() {
            for e in &graph.adj[u] {
                if !reachable[e.target_id] {
                    reachable[e.target_id] = true;
                    queue.push_back(e.target_id);
                }
            }
        }
        assert!(reachable.iter().all(|&r| r));
    }

    #[test]
    fn invariant_edges_are_undirected_symmetric_and_positive() {
        let grid = ten_by_ten_center_obstacle();
        let graph = NavGraph::from_grid(&grid).unwrap();
        for (u, edges) in graph.adj.iter().enumerate() {
            for e in edges {
                assert_ne!(u, e.target_id);
                assert!(e.cost > 0.0);
                let back = graph.adj[e.target_id]
                    .iter()
                    .find(|back_edge| back_edge.target_id == u)
                    .expect("reverse edge must exist");
                assert!((back.cost - e.cost).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn csv_round_trip_preserves_nodes_and_edges() {
        let grid = ten_by_ten_center_obstacle();
        let graph = NavGraph::from_grid(&grid).unwrap();
        let (nodes_csv, edges_csv) = graph.export_csv().unwrap();
        let reloaded = NavGraph::import_csv(&nodes_csv, &edges_csv).unwrap();

        assert_eq!(graph.node_count(), reloaded.node_count());
        for (a, b) in graph.nodes.iter().zip(reloaded.nodes.iter()) {
            assert_eq!(a.centroid, b.centroid);
        }
        for (a, b) in graph.adj.iter().zip(reloaded.adj.iter()) {
            assert_eq!(a.len(), b.len());
        }
    }

    #[test]
    fn empty_grid_is_a_graph_error() {
        let grid = Grid::load_from_str("2 2\n##\n##\n", Resolution::Decimeters, 0.0).unwrap();
        let err = NavGraph::from_grid(&grid).unwrap_err();
        assert!(matches!(err, GraphError::EmptyGrid));
    }
}
