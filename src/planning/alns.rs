//! Adaptive Large Neighborhood Search.
//! Grounded in `solver/tabu_search/search.rs`'s destroy/repair/accept loop
//! shape (iterate, mutate, re-evaluate, keep best-seen), specialized here to
//! removal-saving destroy and regret-2 repair.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::mapping::cost_matrix::CostMatrix;

use super::solver::{greedy_seed, route_cost, Solution, VRPResult, VRPStrategy};
use super::task::{RobotAgent, Task};

#[derive(Debug, Clone, Copy)]
pub struct AlnsConfig {
    pub iterations: usize,
    pub removal_fraction: f64,
    pub random_destroy_probability: f64,
    pub seed: u64,
}

impl Default for AlnsConfig {
    fn default() -> Self {
        AlnsConfig {
            iterations: 200,
            removal_fraction: 0.25,
            random_destroy_probability: 0.1,
            seed: 42,
        }
    }
}

pub struct Alns {
    pub config: AlnsConfig,
}

impl Alns {
    pub fn new(config: AlnsConfig) -> Self {
        Alns { config }
    }
}

impl VRPStrategy for Alns {
    fn solve(&self, tasks: &[Task], robots: &[RobotAgent], costs: &CostMatrix) -> VRPResult {
        let start = std::time::Instant::now();
        if tasks.is_empty() {
            return VRPResult::empty(self.name());
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut current = greedy_seed(tasks, robots, costs, None, 4, &mut rng);
        let mut best = current.clone();
        let mut best_makespan = best.makespan(tasks, robots, costs);

        let removal_count = ((self.config.removal_fraction * tasks.len() as f64).ceil() as usize)
            .max(1)
            .min(tasks.len());

        for iteration in 0..self.config.iterations {
            let removed = destroy(&current, tasks, robots, costs, removal_count, &mut rng, &self.config);
            current = repair(removed.0, removed.1, tasks, robots, costs);

            let candidate_makespan = current.makespan(tasks, robots, costs);
            if candidate_makespan < best_makespan {
                best = current.clone();
                best_makespan = candidate_makespan;
                debug!(iteration, makespan = best_makespan, "ALNS improved best");
            } else {
                // Greedy acceptance: only keep the destroyed/repaired
                // solution if it improved; otherwise resume from best-seen.
                current = best.clone();
            }
        }

        info!(iterations = self.config.iterations, makespan = best_makespan, "ALNS finished");
        let compute_ms = start.elapsed().as_secs_f64() * 1000.0;
        best.into_vrp_result(tasks, robots, costs, compute_ms, self.name(), false)
    }

    fn name(&self) -> &'static str {
        "alns"
    }
}

/// Removes the top-`removal_count` highest-removal-saving tasks from
/// `solution`. Returns the reduced solution plus the removed task indices.
fn destroy(
    solution: &Solution,
    tasks: &[Task],
    robots: &[RobotAgent],
    costs: &CostMatrix,
    removal_count: usize,
    rng: &mut impl Rng,
    config: &AlnsConfig,
) -> (Solution, Vec<usize>) {
    let mut candidates: Vec<(usize, usize, f64)> = Vec::new(); // (robot, pos, saving)

    for (r_idx, route) in solution.routes.iter().enumerate() {
        let start_node = robots[r_idx].current_node_id;
        for (pos, &task_idx) in route.iter().enumerate() {
            let task = &tasks[task_idx];
            let prev = if pos == 0 {
                start_node
            } else {
                tasks[route[pos - 1]].dest_node
            };
            let next = route.get(pos + 1).map(|&t| tasks[t].source_node);

            let removed_cost = costs.get_cost(prev, task.source_node)
                + costs.get_cost(task.source_node, task.dest_node)
                + next.map(|n| costs.get_cost(task.dest_node, n)).unwrap_or(0.0);
            let bypass_cost = next.map(|n| costs.get_cost(prev, n)).unwrap_or(0.0);
            let saving = removed_cost - bypass_cost;
            candidates.push((r_idx, pos, saving));
        }
    }

    let use_random = rng.gen::<f64>() < config.random_destroy_probability;
    let mut chosen: Vec<(usize, usize)> = if use_random {
        let mut all: Vec<(usize, usize)> = candidates.iter().map(|&(r, p, _)| (r, p)).collect();
        all.shuffle(rng);
        all.into_iter().take(removal_count).collect()
    } else {
        candidates.sort_by(|a, b| b.2.total_cmp(&a.2));
        candidates
            .into_iter()
            .take(removal_count)
            .map(|(r, p, _)| (r, p))
            .collect()
    };
    // Remove highest positions first so indices stay valid within a route.
    chosen.sort_by(|a, b| b.cmp(a));

    let mut routes = solution.routes.clone();
    let mut removed_tasks = Vec::new();
    for (r_idx, pos) in chosen {
        removed_tasks.push(routes[r_idx].remove(pos));
    }

    (Solution { routes }, removed_tasks)
}

/// Regret-2 repair: repeatedly inserts the unassigned task whose
/// second-best insertion cost exceeds its best by the widest margin, at its
/// own best position.
fn repair(
    mut solution: Solution,
    mut unassigned: Vec<usize>,
    tasks: &[Task],
    robots: &[RobotAgent],
    costs: &CostMatrix,
) -> Solution {
    while !unassigned.is_empty() {
        let mut best_choice: Option<(usize, usize, usize, f64, f64)> = None; // (list_idx, robot, pos, best_cost, regret)

        for (list_idx, &task_idx) in unassigned.iter().enumerate() {
            let mut insertion_costs: Vec<f64> = Vec::new();
            let mut best_for_task: Option<(usize, usize, f64)> = None;

            for (r_idx, route) in solution.routes.iter().enumerate() {
                let start_node = robots[r_idx].current_node_id;
                for pos in 0..=route.len() {
                    let cost = insertion_cost(start_node, route, pos, task_idx, tasks, costs);
                    insertion_costs.push(cost);
                    if best_for_task.map(|(_, _, c)| cost < c).unwrap_or(true) {
                        best_for_task = Some((r_idx, pos, cost));
                    }
                }
            }

            let Some((robot, pos, best_cost)) = best_for_task else {
                continue;
            };
            insertion_costs.sort_by(|a, b| a.total_cmp(b));
            let second_best = insertion_costs.get(1).copied().unwrap_or(best_cost);
            let regret = second_best - best_cost;

            let is_better = match &best_choice {
                None => true,
                Some((_, _, _, _, best_regret)) => regret > *best_regret,
            };
            if is_better {
                best_choice = Some((list_idx, robot, pos, best_cost, regret));
            }
        }

        match best_choice {
            Some((list_idx, robot, pos, ..)) => {
                let task_idx = unassigned.remove(list_idx);
                solution.routes[robot].insert(pos, task_idx);
            }
            None => break,
        }
    }

    solution
}

fn insertion_cost(
    start_node: usize,
    route: &[usize],
    pos: usize,
    task_idx: usize,
    tasks: &[Task],
    costs: &CostMatrix,
) -> f64 {
    let mut candidate = route.to_vec();
    candidate.insert(pos, task_idx);
    route_cost(start_node, &candidate, tasks, costs) - route_cost(start_node, route, tasks, costs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Coordinates;
    use crate::mapping::navgraph::{Edge, Node, NavGraph};
    use crate::planning::task::{RobotAgent, TaskId};

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
    fn alns_never_worsens_the_greedy_seed() {
        let nav = grid_nav();
        let mut costs = CostMatrix::new();
        costs.precompute_for(&nav, &[0, 1, 2, 3, 4]);

        let robots = vec![RobotAgent::new(1, 0), RobotAgent::new(2, 4)];
        let tasks = vec![
            Task {
                id: TaskId(1),
                source_node: 0,
                dest_node: 1,
                source_id_str: None,
                dest_id_str: None,
            },
            Task {
                id: TaskId(2),
                source_node: 1,
                dest_node: 2,
                source_id_str: None,
                dest_id_str: None,
            },
            Task {
                id: TaskId(3),
                source_node: 3,
                dest_node: 4,
                source_id_str: None,
                dest_id_str: None,
            },
            Task {
                id: TaskId(4),
                source_node: 2,
                dest_node: 3,
                source_id_str: None,
                dest_id_str: None,
            },
        ];

        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let seed_solution = greedy_seed(&tasks, &robots, &costs, None, 4, &mut rng);
        let seed_makespan = seed_solution.makespan(&tasks, &robots, &costs);

        let alns = Alns::new(AlnsConfig {
            iterations: 30,
            ..AlnsConfig::default()
        });
        let result = alns.solve(&tasks, &robots, &costs);

        assert!(result.makespan <= seed_makespan + 1e-9);
        assert!(result.is_feasible);
    }
}
