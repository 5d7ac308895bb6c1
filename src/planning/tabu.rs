//! Tabu Search. Grounded directly in
//! `solver/tabu_search/{search,tabu,neighborhood}.rs` — sample candidate
//! moves, pick the best non-tabu one (with aspiration), remember the
//! reverse move in a FIFO tabu list.

use std::collections::VecDeque;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::mapping::cost_matrix::CostMatrix;

use super::moves::{apply_move, sample_moves, Move};
use super::solver::{greedy_seed, Solution, VRPResult, VRPStrategy};
use super::task::{RobotAgent, Task};

#[derive(Debug, Clone, Copy)]
pub struct TabuConfig {
    pub neighbors_per_iter: usize,
    pub tenure: usize,
    pub max_iters_without_improvement: usize,
    pub seed: u64,
}

impl Default for TabuConfig {
    fn default() -> Self {
        TabuConfig {
            neighbors_per_iter: 20,
            tenure: 15,
            max_iters_without_improvement: 100,
            seed: 7,
        }
    }
}

pub struct TabuSearch {
    pub config: TabuConfig,
}

impl TabuSearch {
    pub fn new(config: TabuConfig) -> Self {
        TabuSearch { config }
    }
}

impl VRPStrategy for TabuSearch {
    fn solve(&self, tasks: &[Task], robots: &[RobotAgent], costs: &CostMatrix) -> VRPResult {
        let start = std::time::Instant::now();
        if tasks.is_empty() {
            return VRPResult::empty(self.name());
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut current = greedy_seed(tasks, robots, costs, None, 4, &mut rng);
        let mut best = current.clone();
        let mut best_makespan = best.makespan(tasks, robots, costs);

        let mut tabu_list: VecDeque<Move> = VecDeque::new();
        let mut stale_iters = 0usize;

        while stale_iters < self.config.max_iters_without_improvement {
            let candidates = sample_moves(&current, self.config.neighbors_per_iter, &mut rng);
            if candidates.is_empty() {
                stale_iters += 1;
                continue;
            }

            let mut chosen: Option<(Move, Solution, f64)> = None;
            for mv in candidates {
                let candidate_solution = apply_move(&current, mv);
                let candidate_makespan = candidate_solution.makespan(tasks, robots, costs);
                let is_tabu = tabu_list.contains(&mv);
                let aspirated = candidate_makespan < best_makespan;

                if is_tabu && !aspirated {
                    continue;
                }
                let better = match &chosen {
                    None => true,
                    Some((_, _, c)) => candidate_makespan < *c,
                };
                if better {
                    chosen = Some((mv, candidate_solution, candidate_makespan));
                }
            }

            let Some((mv, candidate_solution, candidate_makespan)) = chosen else {
                stale_iters += 1;
                continue;
            };

            current = candidate_solution;
            tabu_list.push_back(mv.reverse());
            if tabu_list.len() > self.config.tenure {
                tabu_list.pop_front();
            }

            if candidate_makespan < best_makespan - 1e-9 {
                best = current.clone();
                best_makespan = candidate_makespan;
                stale_iters = 0;
                debug!(makespan = best_makespan, "tabu search improved best");
            } else {
                stale_iters += 1;
            }
        }

        info!(makespan = best_makespan, "tabu search finished");
        let compute_ms = start.elapsed().as_secs_f64() * 1000.0;
        best.into_vrp_result(tasks, robots, costs, compute_ms, self.name(), false)
    }

    fn name(&self) -> &'static str {
        "tabu_search"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Coordinates;
    use crate::mapping::navgraph::{Edge, Node, NavGraph};
    use crate::planning::task::TaskId;

    fn grid_nav() -> NavGraph {
        let nodes = (0..5)
            .map(|id| Node {
                id,
                centroid: Coordinates::new(id as i32, 0),
            })
            .collect();
        let mut adj = vec![Vec::new(); 5];
        for i in 0..4 {
            adj[i].push(Edge {
                target_id: i + 1,
                cost: 1.0,
            });
            adj[i + 1].push(Edge {
                target_id: i,
                cost: 1.0,
            });
        }
        NavGraph { nodes, adj }
    }

    #[test]
    fn tabu_search_returns_feasible_solution() {
        let nav = grid_nav();
        let mut costs = CostMatrix::new();
        costs.precompute_for(&nav, &[0, 1, 2, 3, 4]);
        let robots = vec![RobotAgent::new(1, 0), RobotAgent::new(2, 4)];
        let tasks = vec![
            Task {
                id: TaskId(1),
                source_node: 0,
                dest_node: 2,
                source_id_str: None,
                dest_id_str: None,
            },
            Task {
                id: TaskId(2),
                source_node: 2,
                dest_node: 4,
                source_id_str: None,
                dest_id_str: None,
            },
        ];
        let solver = TabuSearch::new(TabuConfig {
            max_iters_without_improvement: 20,
            ..TabuConfig::default()
        });
        let result = solver.solve(&tasks, &robots, &costs);
        assert!(result.is_feasible);
        assert!(result.makespan.is_finite());
    }
}
