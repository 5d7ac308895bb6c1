//! Pathfinder (C5): any-angle Theta* search on the inflated grid.
//! Grounded in
//! `original_source/backend/layer3/include/Pathfinding/ThetaStarSolver.hh`.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::errors::PathError;
use crate::geometry::Coordinates;
use crate::mapping::grid::Grid;

#[derive(Debug, Clone)]
pub struct PathResult {
    pub path: Vec<Coordinates>,
    pub success: bool,
    pub length: f64,
    pub nodes_expanded: usize,
    pub compute_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct OpenEntry {
    f_score: f64,
    cell: Coordinates,
}

impl Eq for OpenEntry {}
impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.cell.x.cmp(&self.cell.x))
            .then_with(|| other.cell.y.cmp(&self.cell.y))
    }
}
impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Bresenham rasterization line-of-sight check against the inflated grid.
pub fn line_of_sight(grid: &Grid, from: Coordinates, to: Coordinates) -> bool {
    let (mut x0, mut y0) = (from.x, from.y);
    let (x1, y1) = (to.x, to.y);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if !grid.is_accessible_safe(Coordinates::new(x0, y0)) {
            return false;
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
    true
}

pub struct Pathfinder {
    /// Step size in pixels between successive grid samples.
    pub step: i32,
}

impl Pathfinder {
    pub fn new(step: i32) -> Self {
        Pathfinder { step: step.max(1) }
    }

    pub fn find_path(&self, grid: &Grid, start: Coordinates, goal: Coordinates) -> PathResult {
        let start_time = std::time::Instant::now();

        if !grid.in_bounds(start) || !grid.in_bounds(goal) {
            return PathResult {
                path: Vec::new(),
                success: false,
                length: 0.0,
                nodes_expanded: 0,
                compute_ms: start_time.elapsed().as_secs_f64() * 1000.0,
            };
        }

        let mut open = BinaryHeap::new();
        let mut g_score: HashMap<Coordinates, f64> = HashMap::new();
        let mut parent: HashMap<Coordinates, Coordinates> = HashMap::new();
        let mut closed: HashMap<Coordinates, bool> = HashMap::new();
        let mut nodes_expanded = 0usize;

        g_score.insert(start, 0.0);
        parent.insert(start, start);
        open.push(OpenEntry {
            f_score: start.euclidean(&goal),
            cell: start,
        });

        while let Some(OpenEntry { cell: current, .. }) = open.pop() {
            if closed.get(&current).copied().unwrap_or(false) {
                continue;
            }
            closed.insert(current, true);
            nodes_expanded += 1;

            if current == goal {
                let path = reconstruct(&parent, grid, start, goal);
                let length = path_length(&path);
                return PathResult {
                    path,
                    success: true,
                    length,
                    nodes_expanded,
                    compute_ms: start_time.elapsed().as_secs_f64() * 1000.0,
                };
            }

            let current_g = g_score[&current];
            let current_parent = parent[&current];

            for (dx, dy) in NEIGHBOR_OFFSETS {
                let neighbor = Coordinates::new(current.x + dx * self.step, current.y + dy * self.step);
                if !grid.is_accessible_safe(neighbor) {
                    continue;
                }
                if closed.get(&neighbor).copied().unwrap_or(false) {
                    continue;
                }

                // Any-angle relaxation: if the grandparent has line-of-sight
                // to this neighbor, attach directly to it instead of `current`.
                let (tentative_parent, tentative_g) =
                    if line_of_sight(grid, current_parent, neighbor) {
                        (current_parent, g_score[&current_parent] + current_parent.euclidean(&neighbor))
                    } else {
                        (current, current_g + current.euclidean(&neighbor))
                    };

                if tentative_g < *g_score.get(&neighbor).unwrap_or(&f64::INFINITY) {
                    g_score.insert(neighbor, tentative_g);
                    parent.insert(neighbor, tentative_parent);
                    let f = tentative_g + neighbor.euclidean(&goal);
                    open.push(OpenEntry {
                        f_score: f,
                        cell: neighbor,
                    });
                }
            }
        }

        PathResult {
            path: Vec::new(),
            success: false,
            length: 0.0,
            nodes_expanded,
            compute_ms: start_time.elapsed().as_secs_f64() * 1000.0,
        }
    }
}

fn reconstruct(
    parent: &HashMap<Coordinates, Coordinates>,
    grid: &Grid,
    start: Coordinates,
    goal: Coordinates,
) -> Vec<Coordinates> {
    let mut raw = vec![goal];
    let mut current = goal;
    while current != start {
        current = parent[&current];
        raw.push(current);
    }
    raw.reverse();

    // Post-process: drop any waypoint whose neighbors already have line of
    // sight to each other.
    if raw.len() < 3 {
        return raw;
    }
    let mut simplified = vec![raw[0]];
    let mut i = 0;
    while i < raw.len() - 1 {
        let mut j = raw.len() - 1;
        while j > i + 1 && !line_of_sight(grid, raw[i], raw[j]) {
            j -= 1;
        }
        simplified.push(raw[j]);
        i = j;
    }
    simplified
}

fn path_length(path: &[Coordinates]) -> f64 {
    path.windows(2).map(|w| w[0].euclidean(&w[1])).sum()
}

/// Convenience wrapper returning `PathError::NoPath` when the open set
/// empties without reaching the goal.
pub fn find_path_or_err(
    pathfinder: &Pathfinder,
    grid: &Grid,
    start: Coordinates,
    goal: Coordinates,
) -> Result<PathResult, PathError> {
    if !grid.in_bounds(start) || !grid.in_bounds(goal) {
        return Err(PathError::OutOfBounds);
    }
    let result = pathfinder.find_path(grid, start, goal);
    if result.success {
        Ok(result)
    } else {
        Err(PathError::NoPath)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Resolution;

    fn empty_grid(n: usize) -> Grid {
        let mut text = format!("{n} {n}\n");
        for _ in 0..n {
            text.push_str(&".".repeat(n));
            text.push('\n');
        }
        Grid::load_from_str(&text, Resolution::Decimeters, 0.0).unwrap()
    }

    #[test]
    fn theta_star_takes_line_of_sight_shortcut() {
        let grid = empty_grid(20);
        let pf = Pathfinder::new(1);
        let start = Coordinates::new(1, 1);
        let goal = Coordinates::new(18, 18);
        let result = pf.find_path(&grid, start, goal);
        assert!(result.success);
        let euclid = start.euclidean(&goal);
        assert!(result.length <= euclid * 1.02);
        assert!(result.nodes_expanded <= 200);
    }

    #[test]
    fn no_path_when_goal_is_walled_off() {
        let mut text = String::from("5 5\n");
        for y in 0..5 {
            for x in 0..5 {
                // Wall off column 2 entirely, splitting the grid in two.
                text.push(if x == 2 { '#' } else { '.' });
                let _ = y;
            }
            text.push('\n');
        }
        let grid = Grid::load_from_str(&text, Resolution::Decimeters, 0.0).unwrap();
        let pf = Pathfinder::new(1);
        let result = pf.find_path(&grid, Coordinates::new(0, 0), Coordinates::new(4, 4));
        assert!(!result.success);
    }

    #[test]
    fn line_of_sight_blocked_by_obstacle() {
        let grid = Grid::load_from_str("3 1\n.#.\n", Resolution::Decimeters, 0.0).unwrap();
        assert!(!line_of_sight(
            &grid,
            Coordinates::new(0, 0),
            Coordinates::new(2, 0)
        ));
    }

    #[test]
    fn find_path_or_err_reports_out_of_bounds() {
        let grid = empty_grid(5);
        let pf = Pathfinder::new(1);
        let err = find_path_or_err(&pf, &grid, Coordinates::new(0, 0), Coordinates::new(50, 50))
            .unwrap_err();
        assert!(matches!(err, PathError::OutOfBounds));
    }
}
