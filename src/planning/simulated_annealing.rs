//! Simulated Annealing. Grounded in `utils::temperature`'s
//! cooling schedule and the Metropolis-style acceptance used inline in
//! `solver/tabu_search/search.rs`'s main loop.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::mapping::cost_matrix::CostMatrix;

use super::moves::{apply_move, sample_moves};
use super::solver::{greedy_seed, VRPResult, VRPStrategy};
use super::task::{RobotAgent, Task};

#[derive(Debug, Clone, Copy)]
pub struct SimulatedAnnealingConfig {
    pub initial_temperature: f64,
    pub min_temperature: f64,
    pub cooling_factor: f64,
    pub iterations_per_temperature: usize,
    pub seed: u64,
}

impl Default for SimulatedAnnealingConfig {
    fn default() -> Self {
        SimulatedAnnealingConfig {
            initial_temperature: 50.0,
            min_temperature: 0.5,
            cooling_factor: 0.95,
            iterations_per_temperature: 20,
            seed: 13,
        }
    }
}

pub struct SimulatedAnnealing {
    pub config: SimulatedAnnealingConfig,
}

impl SimulatedAnnealing {
    pub fn new(config: SimulatedAnnealingConfig) -> Self {
        SimulatedAnnealing { config }
    }
}

impl VRPStrategy for SimulatedAnnealing {
    fn solve(&self, tasks: &[Task], robots: &[RobotAgent], costs: &CostMatrix) -> VRPResult {
        let start = std::time::Instant::now();
        if tasks.is_empty() {
            return VRPResult::empty(self.name());
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut current = greedy_seed(tasks, robots, costs, None, 4, &mut rng);
        let mut current_makespan = current.makespan(tasks, robots, costs);
        let mut best = current.clone();
        let mut best_makespan = current_makespan;

        let mut temperature = self.config.initial_temperature;
        while temperature >= self.config.min_temperature {
            for _ in 0..self.config.iterations_per_temperature {
                let Some(&mv) = sample_moves(&current, 1, &mut rng).first() else {
                    continue;
                };
                let candidate = apply_move(&current, mv);
                let candidate_makespan = candidate.makespan(tasks, robots, costs);
                let delta = candidate_makespan - current_makespan;

                let accept = if delta < 0.0 {
                    true
                } else {
                    rng.gen::<f64>() < (-delta / temperature.max(f64::EPSILON)).exp()
                };

                if accept {
                    current = candidate;
                    current_makespan = candidate_makespan;
                    if current_makespan < best_makespan - 1e-9 {
                        best = current.clone();
                        best_makespan = current_makespan;
                        debug!(makespan = best_makespan, temperature, "SA improved best");
                    }
                }
            }
            temperature *= self.config.cooling_factor;
        }

        info!(makespan = best_makespan, "simulated annealing finished");
        let compute_ms = start.elapsed().as_secs_f64() * 1000.0;
        best.into_vrp_result(tasks, robots, costs, compute_ms, self.name(), false)
    }

    fn name(&self) -> &'static str {
        "simulated_annealing"
    }
}
