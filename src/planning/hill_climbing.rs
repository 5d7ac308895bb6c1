//! Hill Climbing. Exhaustively scans every inter-robot
//! transfer/swap and intra-robot reorder, takes the first improving move,
//! and restarts from a random greedy seed when no move improves (plateau).
//! Grounded in `solver/tabu_search/search.rs`'s stagnation-triggered
//! destroy-and-recreate restart, generalized to Transfer/Swap/Reorder moves.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::mapping::cost_matrix::CostMatrix;

use super::moves::{all_moves, apply_move};
use super::solver::{greedy_seed, VRPResult, VRPStrategy};
use super::task::{RobotAgent, Task};

#[derive(Debug, Clone, Copy)]
pub struct HillClimbingConfig {
    pub max_restarts: usize,
    pub seed: u64,
}

impl Default for HillClimbingConfig {
    fn default() -> Self {
        HillClimbingConfig {
            max_restarts: 5,
            seed: 21,
        }
    }
}

pub struct HillClimbing {
    pub config: HillClimbingConfig,
}

impl HillClimbing {
    pub fn new(config: HillClimbingConfig) -> Self {
        HillClimbing { config }
    }
}

impl VRPStrategy for HillClimbing {
    fn solve(&self, tasks: &[Task], robots: &[RobotAgent], costs: &CostMatrix) -> VRPResult {
        let start = std::time::Instant::now();
        if tasks.is_empty() {
            return VRPResult::empty(self.name());
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut best = greedy_seed(tasks, robots, costs, None, 4, &mut rng);
        let mut best_makespan = best.makespan(tasks, robots, costs);

        for restart in 0..=self.config.max_restarts {
            let mut current = if restart == 0 {
                best.clone()
            } else {
                greedy_seed(tasks, robots, costs, None, 1, &mut rng)
            };
            let mut current_makespan = current.makespan(tasks, robots, costs);

            loop {
                let mut improved = false;
                for mv in all_moves(&current) {
                    let candidate = apply_move(&current, mv);
                    let candidate_makespan = candidate.makespan(tasks, robots, costs);
                    if candidate_makespan < current_makespan - 1e-9 {
                        current = candidate;
                        current_makespan = candidate_makespan;
                        improved = true;
                        break; // first-improvement
                    }
                }
                if !improved {
                    break;
                }
            }

            if current_makespan < best_makespan - 1e-9 {
                best = current;
                best_makespan = current_makespan;
                debug!(restart, makespan = best_makespan, "hill climbing improved best");
            }
        }

        info!(makespan = best_makespan, "hill climbing finished");
        let compute_ms = start.elapsed().as_secs_f64() * 1000.0;
        best.into_vrp_result(tasks, robots, costs, compute_ms, self.name(), false)
    }

    fn name(&self) -> &'static str {
        "hill_climbing"
    }
}
