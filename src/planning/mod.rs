//! Layer P (Planning): the VRP solver and its pluggable strategies.

pub mod alns;
pub mod hill_climbing;
pub mod moves;
pub mod simulated_annealing;
pub mod solver;
pub mod tabu;
pub mod task;

pub use alns::{Alns, AlnsConfig};
pub use hill_climbing::{HillClimbing, HillClimbingConfig};
pub use simulated_annealing::{SimulatedAnnealing, SimulatedAnnealingConfig};
pub use solver::{
    cheapest_insertion, expand_itinerary, greedy_seed, itinerary_cost, route_cost, GreedyOnce,
    Solution, VRPResult, VRPStrategy,
};
pub use tabu::{TabuConfig, TabuSearch};
pub use task::{BatteryModel, RobotAgent, RobotStatus, Task, TaskId};
