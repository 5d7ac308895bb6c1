//! Shared VRP types: the `VRPStrategy` trait, `VRPResult`, route costing and
//! the greedy seed construction used by every strategy.
//! Grounded in `domain/types.rs` and `evaluation/fitness.rs` (flat
//! free-function costing over a shared distance matrix) and
//! `original_source/backend/layer2/include/{IVRPSolver,GreedySolver}.hh`.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::mapping::cost_matrix::CostMatrix;

use super::task::{BatteryModel, RobotAgent, Task, TaskId};

#[derive(Debug, Clone)]
pub struct VRPResult {
    pub assignments: HashMap<u64, Vec<usize>>,
    /// The task ids behind each `assignments` entry, index-aligned with its
    /// `[src, dst]` pairs (`task_assignments[id][i]` is the task for
    /// `assignments[id][2*i..2*i+2]`).
    pub task_assignments: HashMap<u64, Vec<TaskId>>,
    pub makespan: f64,
    pub total_distance: f64,
    pub compute_ms: f64,
    pub is_feasible: bool,
    pub is_optimal: bool,
    pub algorithm_name: String,
}

impl VRPResult {
    pub fn empty(algorithm_name: &str) -> Self {
        VRPResult {
            assignments: HashMap::new(),
            task_assignments: HashMap::new(),
            makespan: 0.0,
            total_distance: 0.0,
            compute_ms: 0.0,
            is_feasible: true,
            is_optimal: true,
            algorithm_name: algorithm_name.to_string(),
        }
    }
}

/// A candidate solution: `routes[i]` is the ordered list of task indices
/// (into the `tasks` slice given to the solver) assigned to `robots[i]`.
#[derive(Debug, Clone)]
pub struct Solution {
    pub routes: Vec<Vec<usize>>,
}

impl Solution {
    pub fn empty(num_robots: usize) -> Self {
        Solution {
            routes: vec![Vec::new(); num_robots],
        }
    }

    pub fn route_costs(&self, tasks: &[Task], robots: &[RobotAgent], costs: &CostMatrix) -> Vec<f64> {
        self.routes
            .iter()
            .zip(robots)
            .map(|(route, robot)| route_cost(robot.current_node_id, route, tasks, costs))
            .collect()
    }

    pub fn makespan(&self, tasks: &[Task], robots: &[RobotAgent], costs: &CostMatrix) -> f64 {
        self.route_costs(tasks, robots, costs)
            .into_iter()
            .fold(0.0, f64::max)
    }

    pub fn total_distance(&self, tasks: &[Task], robots: &[RobotAgent], costs: &CostMatrix) -> f64 {
        self.route_costs(tasks, robots, costs)
            .into_iter()
            .filter(|c| c.is_finite())
            .sum()
    }

    /// A task left out of every route (unreachable from any robot start)
    /// also marks the solution infeasible, even though it contributes no
    /// route cost.
    pub fn is_feasible(&self, tasks: &[Task], robots: &[RobotAgent], costs: &CostMatrix) -> bool {
        let assigned: usize = self.routes.iter().map(|r| r.len()).sum();
        assigned == tasks.len()
            && self
                .route_costs(tasks, robots, costs)
                .into_iter()
                .all(|c| c.is_finite())
    }

    pub fn into_vrp_result(
        self,
        tasks: &[Task],
        robots: &[RobotAgent],
        costs: &CostMatrix,
        compute_ms: f64,
        algorithm_name: &str,
        is_optimal: bool,
    ) -> VRPResult {
        let makespan = self.makespan(tasks, robots, costs);
        let total_distance = self.total_distance(tasks, robots, costs);
        let is_feasible = self.is_feasible(tasks, robots, costs);
        let task_assignments = robots
            .iter()
            .zip(&self.routes)
            .map(|(robot, route)| (robot.id, route.iter().map(|&t| tasks[t].id).collect()))
            .collect();
        let assignments = robots
            .iter()
            .zip(self.routes)
            .map(|(robot, route)| (robot.id, expand_itinerary(&route, tasks)))
            .collect();
        VRPResult {
            assignments,
            task_assignments,
            makespan,
            total_distance,
            compute_ms,
            is_feasible,
            is_optimal,
            algorithm_name: algorithm_name.to_string(),
        }
    }
}

/// Flattens a robot's ordered task list into the `[src, dst, src, dst, ...]`
/// node itinerary reported in `VRPResult`.
pub fn expand_itinerary(route: &[usize], tasks: &[Task]) -> Vec<usize> {
    route
        .iter()
        .flat_map(|&t| [tasks[t].source_node, tasks[t].dest_node])
        .collect()
}

/// Sums travel cost across `ordered_tasks` starting from `start`. Any
/// unreachable leg (`+inf` in the cost matrix) propagates to an infinite
/// total, marking the route infeasible.
pub fn route_cost(start: usize, route: &[usize], tasks: &[Task], costs: &CostMatrix) -> f64 {
    if route.is_empty() {
        return 0.0;
    }
    let mut total = costs.get_cost(start, tasks[route[0]].source_node);
    for (i, &t) in route.iter().enumerate() {
        let task = &tasks[t];
        total += costs.get_cost(task.source_node, task.dest_node);
        if i + 1 < route.len() {
            let next = &tasks[route[i + 1]];
            total += costs.get_cost(task.dest_node, next.source_node);
        }
    }
    total
}

/// Pluggable VRP strategy.
pub trait VRPStrategy {
    fn solve(&self, tasks: &[Task], robots: &[RobotAgent], costs: &CostMatrix) -> VRPResult;
    fn name(&self) -> &'static str;
}

/// Per-robot running state while constructing a greedy route, tracking
/// battery so a charging detour can be inserted before it would be
/// exhausted.
struct GreedyRobotState {
    current_node: usize,
    battery_percent: f64,
    time_s: f64,
    tasks: Vec<usize>,
}

/// One pass of the greedy construction over `order` (an ordering of task
/// indices). Returns the resulting [`Solution`].
fn greedy_once(
    order: &[usize],
    tasks: &[Task],
    robots: &[RobotAgent],
    costs: &CostMatrix,
    battery: Option<(&BatteryModel, &[usize])>,
) -> Solution {
    let mut states: Vec<GreedyRobotState> = robots
        .iter()
        .map(|r| GreedyRobotState {
            current_node: r.current_node_id,
            battery_percent: r.battery_percent,
            time_s: 0.0,
            tasks: Vec::new(),
        })
        .collect();

    for &task_idx in order {
        let task = &tasks[task_idx];
        // (robot, completion_time, new_battery_percent, charging_node_used)
        let mut best: Option<(usize, f64, f64, Option<usize>)> = None;

        for (r_idx, state) in states.iter().enumerate() {
            let direct_cost = costs.get_cost(state.current_node, task.source_node)
                + costs.get_cost(task.source_node, task.dest_node);
            if !direct_cost.is_finite() {
                continue;
            }

            let (completion, new_battery, charge_node) = match battery {
                Some((model, charging_nodes)) if !charging_nodes.is_empty() => {
                    let drain = model.drain_percent_for_cost(direct_cost);
                    if state.battery_percent - drain < model.low_threshold_percent {
                        let nearest_charger = charging_nodes
                            .iter()
                            .copied()
                            .min_by(|&a, &b| {
                                costs
                                    .get_cost(state.current_node, a)
                                    .total_cmp(&costs.get_cost(state.current_node, b))
                            });
                        match nearest_charger {
                            Some(charger) => {
                                let to_charger = costs.get_cost(state.current_node, charger);
                                let from_charger = costs.get_cost(charger, task.source_node);
                                let detour = to_charger + from_charger;
                                if !detour.is_finite() {
                                    continue;
                                }
                                let task_leg = costs.get_cost(task.source_node, task.dest_node);
                                let completion = state.time_s
                                    + model.seconds_for_cost(detour)
                                    + model.recharge_time_s
                                    + model.seconds_for_cost(task_leg);
                                let battery_after =
                                    100.0 - model.drain_percent_for_cost(task_leg);
                                (completion, battery_after, Some(charger))
                            }
                            None => continue,
                        }
                    } else {
                        let completion = state.time_s + model.seconds_for_cost(direct_cost);
                        (completion, state.battery_percent - drain, None)
                    }
                }
                _ => (state.time_s + direct_cost, state.battery_percent, None),
            };

            let better = match &best {
                None => true,
                Some((best_r, best_completion, ..)) => {
                    completion < *best_completion - 1e-9
                        || ((completion - *best_completion).abs() <= 1e-9
                            && tie_break_prefers(r_idx, *best_r, &states))
                }
            };
            if better {
                best = Some((r_idx, completion, new_battery, charge_node));
            }
        }

        if let Some((r_idx, completion, new_battery, charge_node)) = best {
            let state = &mut states[r_idx];
            state.tasks.push(task_idx);
            state.time_s = completion;
            state.battery_percent = new_battery;
            state.current_node = task.dest_node;
            if charge_node.is_some() {
                debug!(task = task_idx, robot = r_idx, "inserted charging detour");
            }
        }
    }

    Solution {
        routes: states.into_iter().map(|s| s.tasks).collect(),
    }
}

fn tie_break_prefers(candidate: usize, current_best: usize, states: &[GreedyRobotState]) -> bool {
    let candidate_len = states[candidate].tasks.len();
    let best_len = states[current_best].tasks.len();
    if candidate_len != best_len {
        return candidate_len < best_len;
    }
    candidate < current_best
}

/// Multi-start greedy seed: tries `num_starts` shuffles of the task order
/// and keeps the lowest-makespan result.
pub fn greedy_seed(
    tasks: &[Task],
    robots: &[RobotAgent],
    costs: &CostMatrix,
    battery: Option<(&BatteryModel, &[usize])>,
    num_starts: usize,
    rng: &mut impl Rng,
) -> Solution {
    if robots.is_empty() || tasks.is_empty() {
        return Solution::empty(robots.len());
    }

    let identity: Vec<usize> = (0..tasks.len()).collect();
    let mut best = greedy_once(&identity, tasks, robots, costs, battery);
    let mut best_makespan = best.makespan(tasks, robots, costs);

    let mut order = identity;
    for _ in 1..num_starts.max(1) {
        order.shuffle(rng);
        let candidate = greedy_once(&order, tasks, robots, costs, battery);
        let candidate_makespan = candidate.makespan(tasks, robots, costs);
        if candidate_makespan < best_makespan {
            best = candidate;
            best_makespan = candidate_makespan;
        }
    }

    best
}

/// Cost of a node itinerary (already expanded `[src, dst, src, dst, ...]`
/// pairs), from `start` through every leg. Used by the Orchestrator's cheap
/// insertion (Scenario B) which works directly on `RobotAgent::itinerary`
/// rather than on task-index routes.
pub fn itinerary_cost(start: usize, itinerary: &[usize], costs: &CostMatrix) -> f64 {
    if itinerary.is_empty() {
        return 0.0;
    }
    let mut total = costs.get_cost(start, itinerary[0]);
    for window in itinerary.windows(2) {
        total += costs.get_cost(window[0], window[1]);
    }
    total
}

/// Finds the cheapest robot/position to splice `task`'s `[src, dst]` pair
/// into an existing node itinerary. Positions are pair boundaries (0 =
/// before everything, 1 = after the first task, ...) so the two-waypoints-
/// per-task convention the Orchestrator relies on is
/// preserved. `battery` inflates the cost of robots that would need a
/// charging detour to make the trip, biasing selection away from them,
/// without materializing the detour as itinerary waypoints — the full VRP
/// strategies do that; this path is the cheap, synchronous insertion used
/// for small injected batches.
pub fn cheapest_insertion(
    task: &Task,
    robots: &[RobotAgent],
    costs: &CostMatrix,
    battery: Option<(&BatteryModel, &[usize])>,
) -> Option<(usize, usize, f64)> {
    let mut best: Option<(usize, usize, f64)> = None;

    for (r_idx, robot) in robots.iter().enumerate() {
        let base_cost = itinerary_cost(robot.current_node_id, &robot.itinerary, costs);
        let num_pairs = robot.itinerary.len() / 2;

        for pos in 0..=num_pairs {
            let insert_at = pos * 2;
            let mut candidate = robot.itinerary.clone();
            candidate.splice(insert_at..insert_at, [task.source_node, task.dest_node]);
            let mut added_cost = itinerary_cost(robot.current_node_id, &candidate, costs) - base_cost;
            if !added_cost.is_finite() {
                continue;
            }

            if let Some((model, charging_nodes)) = battery {
                if !charging_nodes.is_empty() {
                    let prefix_cost = itinerary_cost(
                        robot.current_node_id,
                        &candidate[..insert_at.min(candidate.len())],
                        costs,
                    );
                    let projected_battery =
                        robot.battery_percent - model.drain_percent_for_cost(prefix_cost);
                    if projected_battery < model.low_threshold_percent {
                        let nearest = charging_nodes
                            .iter()
                            .copied()
                            .map(|c| costs.get_cost(robot.current_node_id, c))
                            .fold(f64::INFINITY, f64::min);
                        if nearest.is_finite() {
                            added_cost += 2.0 * nearest;
                        }
                    }
                }
            }

            let better = best.map(|(_, _, c)| added_cost < c).unwrap_or(true);
            if better {
                best = Some((r_idx, pos, added_cost));
            }
        }
    }

    best
}

/// Non-iterative strategy: a single greedy construction, no local search.
/// Used standalone and as the Orchestrator's Scenario B seed (spec SPEC_FULL
/// §4.10 supplement).
pub struct GreedyOnce {
    pub num_starts: usize,
    pub seed: u64,
    pub battery: Option<BatteryModel>,
    pub charging_nodes: Vec<usize>,
}

impl GreedyOnce {
    pub fn new(seed: u64) -> Self {
        GreedyOnce {
            num_starts: 8,
            seed,
            battery: None,
            charging_nodes: Vec::new(),
        }
    }

    pub fn with_battery(mut self, model: BatteryModel, charging_nodes: Vec<usize>) -> Self {
        self.battery = Some(model);
        self.charging_nodes = charging_nodes;
        self
    }
}

impl VRPStrategy for GreedyOnce {
    fn solve(&self, tasks: &[Task], robots: &[RobotAgent], costs: &CostMatrix) -> VRPResult {
        let start = std::time::Instant::now();
        if tasks.is_empty() {
            return VRPResult::empty(self.name());
        }
        let mut rng = <rand_chacha::ChaCha8Rng as rand::SeedableRng>::seed_from_u64(self.seed);
        let battery = self
            .battery
            .as_ref()
            .map(|b| (b, self.charging_nodes.as_slice()));
        let solution = greedy_seed(tasks, robots, costs, battery, self.num_starts, &mut rng);
        let compute_ms = start.elapsed().as_secs_f64() * 1000.0;
        solution.into_vrp_result(tasks, robots, costs, compute_ms, self.name(), false)
    }

    fn name(&self) -> &'static str {
        "greedy_once"
    }
}
