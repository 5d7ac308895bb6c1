//! Orchestrator (C11) + TelemetrySink (C12): strategic/physics/obstacle
//! threads sharing fleet, dynamic-obstacle and task-queue state behind
//! locks. Grounded in
//! `original_source/backend/layer3/include/Core/{Orchestrator,FastLoopManager}.hh`
//! and the span-instrumented main-loop style used throughout this crate's
//! logging.

pub mod fleet;
pub mod telemetry;

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, span, Level};

use crate::config::Config;
use crate::driving::{DriverConfig, PathService, Pathfinder, PhysicsLoop};
use crate::geometry::Coordinates;
use crate::mapping::cost_matrix::CostMatrix;
use crate::mapping::grid::Grid;
use crate::mapping::navgraph::NavGraph;
use crate::mapping::poi::{PoiKind, PoiRegistry};
use crate::planning::{
    cheapest_insertion, itinerary_cost, BatteryModel, RobotStatus, Task, TaskId, VRPResult, VRPStrategy,
};

pub use fleet::{Fleet, FleetMember};
pub use telemetry::{FileTelemetrySink, RobotTelemetry, TelemetrySink, TelemetrySnapshot};

/// Placeholder for dynamic-obstacle state; the obstacle thread refreshes
/// this each tick. Extension point only — it may stay a no-op.
#[derive(Debug, Default)]
pub struct DynMap {
    pub obstacles: Vec<Coordinates>,
}

struct BackgroundReplan {
    handle: JoinHandle<VRPResult>,
    fed_tasks: Vec<Task>,
}

/// Shared, lock-protected orchestrator state.
pub struct Orchestrator {
    nav: Arc<NavGraph>,
    grid: Arc<Grid>,
    cost_matrix: Arc<CostMatrix>,
    fleet: Mutex<Fleet>,
    dyn_map: Mutex<DynMap>,
    pending_tasks: Mutex<VecDeque<Task>>,
    injection: Mutex<VecDeque<Task>>,
    background: Mutex<Option<BackgroundReplan>>,
    is_running: AtomicBool,
    initial_solve_done: AtomicBool,
    completed_task_count: AtomicU64,
    config: Config,
    battery_model: BatteryModel,
    charging_nodes: Vec<usize>,
    strategy: Arc<dyn VRPStrategy + Send + Sync>,
}

impl Orchestrator {
    pub fn new(
        nav: Arc<NavGraph>,
        grid: Arc<Grid>,
        cost_matrix: Arc<CostMatrix>,
        poi_registry: &PoiRegistry,
        fleet: Fleet,
        config: Config,
        battery_model: BatteryModel,
        strategy: Arc<dyn VRPStrategy + Send + Sync>,
    ) -> Self {
        let charging_nodes = poi_registry.nodes_of_type(PoiKind::Charging, true);
        Orchestrator {
            nav,
            grid,
            cost_matrix,
            fleet: Mutex::new(fleet),
            dyn_map: Mutex::new(DynMap::default()),
            pending_tasks: Mutex::new(VecDeque::new()),
            injection: Mutex::new(VecDeque::new()),
            background: Mutex::new(None),
            is_running: AtomicBool::new(true),
            initial_solve_done: AtomicBool::new(false),
            completed_task_count: AtomicU64::new(0),
            config,
            battery_model,
            charging_nodes,
            strategy,
        }
    }

    pub fn seed_tasks(&self, tasks: Vec<Task>) {
        let mut pending = self.pending_tasks.lock().expect("pending_tasks poisoned");
        pending.extend(tasks);
    }

    pub fn inject_tasks(&self, tasks: Vec<Task>) {
        let mut injection = self.injection.lock().expect("injection poisoned");
        injection.extend(tasks);
    }

    pub fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn completed_tasks(&self) -> u64 {
        self.completed_task_count.load(Ordering::SeqCst)
    }

    pub fn fleet_size(&self) -> usize {
        self.fleet.lock().expect("fleet poisoned").len()
    }

    /// True once pending and injection queues are drained, every itinerary
    /// is empty, every driver is idle and no background re-plan is
    /// outstanding.
    pub fn is_all_tasks_complete(&self) -> bool {
        let pending_empty = self.pending_tasks.lock().expect("pending_tasks poisoned").is_empty();
        let injection_empty = self.injection.lock().expect("injection poisoned").is_empty();
        let replan_pending = self.background.lock().expect("background poisoned").is_some();
        let fleet_idle = self.fleet.lock().expect("fleet poisoned").is_all_idle_and_empty();
        pending_empty && injection_empty && !replan_pending && fleet_idle
    }

    fn battery_ctx(&self) -> Option<(&BatteryModel, &[usize])> {
        if self.charging_nodes.is_empty() {
            None
        } else {
            Some((&self.battery_model, self.charging_nodes.as_slice()))
        }
    }

    /// One strategic-thread tick.
    pub fn strategic_tick(&self) {
        let span = span!(Level::DEBUG, "strategic_tick");
        let _guard = span.enter();

        self.maybe_run_full_vrp();
        self.poll_background_replan();

        if self.background.lock().expect("background poisoned").is_some() {
            // A re-plan is already running; arrivals stay queued for the
            // next batch rather than starting a second one.
            return;
        }

        let batch: Vec<Task> = {
            let mut injection = self.injection.lock().expect("injection poisoned");
            injection.drain(..).collect()
        };
        if batch.is_empty() {
            return;
        }

        if batch.len() <= self.config.batch_threshold {
            self.apply_cheap_insertion(batch);
        } else {
            self.spawn_background_replan(batch);
        }
    }

    fn maybe_run_full_vrp(&self) {
        let first_solve = !self.initial_solve_done.load(Ordering::SeqCst);
        let (idle_agents, idle_ids) = {
            let fleet = self.fleet.lock().expect("fleet poisoned");
            let idle_ids: Vec<u64> = fleet
                .members
                .iter()
                .filter(|m| m.agent.itinerary.is_empty())
                .map(|m| m.agent.id)
                .collect();
            (fleet.agents(), idle_ids)
        };
        let idle_agents: Vec<_> = idle_agents
            .into_iter()
            .filter(|a| idle_ids.contains(&a.id))
            .collect();

        let should_run = {
            let pending = self.pending_tasks.lock().expect("pending_tasks poisoned");
            !pending.is_empty() && (first_solve || !idle_agents.is_empty())
        };
        if !should_run || idle_agents.is_empty() {
            return;
        }

        let outstanding: Vec<Task> = {
            let mut pending = self.pending_tasks.lock().expect("pending_tasks poisoned");
            pending.drain(..).collect()
        };

        info!(
            robots = idle_agents.len(),
            tasks = outstanding.len(),
            "running full VRP"
        );
        let result = self.strategy.solve(&outstanding, &idle_agents, &self.cost_matrix);
        self.apply_vrp_result(&result);
        self.initial_solve_done.store(true, Ordering::SeqCst);
    }

    fn apply_vrp_result(&self, result: &VRPResult) {
        let mut fleet = self.fleet.lock().expect("fleet poisoned");
        for member in &mut fleet.members {
            if let Some(itinerary) = result.assignments.get(&member.agent.id) {
                if !itinerary.is_empty() {
                    member.agent.itinerary = itinerary.clone();
                    member.agent.assigned_tasks = result
                        .task_assignments
                        .get(&member.agent.id)
                        .cloned()
                        .unwrap_or_default();
                    member.agent.status = RobotStatus::Moving;
                }
            }
        }
    }

    /// Scenario B: cheap synchronous insertion, ascending cost order.
    fn apply_cheap_insertion(&self, batch: Vec<Task>) {
        let mut fleet = self.fleet.lock().expect("fleet poisoned");
        let mut scored: Vec<(Task, usize, usize, f64)> = Vec::new();
        let agents = fleet.agents();
        for task in batch {
            if let Some((robot_idx, pos, cost)) =
                cheapest_insertion(&task, &agents, &self.cost_matrix, self.battery_ctx())
            {
                scored.push((task, robot_idx, pos, cost));
            } else {
                debug!(task_id = task.id.0, "no feasible insertion this tick; requeued");
                self.pending_tasks.lock().expect("pending_tasks poisoned").push_back(task);
            }
        }
        scored.sort_by(|a, b| a.3.total_cmp(&b.3));

        for (task, robot_idx, pos, _) in scored {
            let member = &mut fleet.members[robot_idx];
            let insert_at = pos * 2;
            member
                .agent
                .itinerary
                .splice(insert_at..insert_at, [task.source_node, task.dest_node]);
            member.agent.assigned_tasks.insert(pos, task.id);
            member.agent.status = RobotStatus::Moving;
        }
        info!("applied cheap insertion batch");
    }

    /// Scenario C: spawns a background thread running the full strategy
    /// over outstanding (in-flight) tasks plus the injected batch.
    fn spawn_background_replan(&self, batch: Vec<Task>) {
        let (agents, mut fed_tasks) = {
            let fleet = self.fleet.lock().expect("fleet poisoned");
            (fleet.agents(), fleet.in_flight_tasks())
        };
        fed_tasks.extend(batch);
        let costs = self.cost_matrix.clone();
        let strategy = self.strategy.clone();
        let solve_input = fed_tasks.clone();

        info!(tasks = fed_tasks.len(), "spawning background re-plan");
        let handle = std::thread::spawn(move || strategy.solve(&solve_input, &agents, &costs));

        *self.background.lock().expect("background poisoned") = Some(BackgroundReplan {
            handle,
            fed_tasks,
        });
    }

    /// Polls for a finished background re-plan and atomically swaps its
    /// assignments in, skipping robots already committed to work whose
    /// remaining time exceeds the solver's own runtime estimate. Tasks the
    /// solver dropped (unreachable from any robot) are requeued rather than
    /// lost.
    fn poll_background_replan(&self) {
        let finished = {
            let background = self.background.lock().expect("background poisoned");
            background.as_ref().map(|b| b.handle.is_finished()).unwrap_or(false)
        };
        if !finished {
            return;
        }

        let replan = self.background.lock().expect("background poisoned").take();
        let Some(replan) = replan else { return };
        let result = match replan.handle.join() {
            Ok(result) => result,
            Err(_) => {
                debug!("background re-plan thread panicked; discarding");
                return;
            }
        };

        if !self.is_running() {
            debug!("stopping; discarding finished background re-plan result");
            return;
        }

        let estimate_s = self.config.estimated_replan_time_ms as f64 / 1000.0;
        let mut fleet = self.fleet.lock().expect("fleet poisoned");

        // A robot already mid-itinerary is left untouched when it would
        // finish its remaining work before a re-plan this slow could even
        // have been computed; its current tasks stay off-limits to anyone
        // else's new assignment.
        let mut protected_tasks: HashSet<TaskId> = HashSet::new();
        let mut protected_robots: HashSet<u64> = HashSet::new();
        for member in &fleet.members {
            if member.agent.itinerary.is_empty() {
                continue;
            }
            let remaining_cost =
                itinerary_cost(member.agent.current_node_id, &member.agent.itinerary, &self.cost_matrix);
            let remaining_s = self.battery_model.seconds_for_cost(remaining_cost);
            if remaining_s < estimate_s {
                protected_robots.insert(member.agent.id);
                protected_tasks.extend(member.agent.assigned_tasks.iter().copied());
            }
        }

        let mut reassigned: HashSet<u64> = HashSet::new();
        for member in &mut fleet.members {
            if protected_robots.contains(&member.agent.id) {
                continue;
            }
            let Some(itinerary) = result.assignments.get(&member.agent.id) else {
                continue;
            };
            let task_ids = result
                .task_assignments
                .get(&member.agent.id)
                .cloned()
                .unwrap_or_default();

            let mut new_itinerary = Vec::with_capacity(itinerary.len());
            let mut new_task_ids = Vec::with_capacity(task_ids.len());
            for (pair, task_id) in itinerary.chunks(2).zip(task_ids.iter()) {
                if protected_tasks.contains(task_id) {
                    // Already being handled by a robot we're not touching.
                    continue;
                }
                new_itinerary.extend_from_slice(pair);
                new_task_ids.push(*task_id);
                reassigned.insert(task_id.0);
            }

            member.agent.status = if new_itinerary.is_empty() {
                RobotStatus::Idle
            } else {
                RobotStatus::Moving
            };
            member.agent.itinerary = new_itinerary;
            member.agent.assigned_tasks = new_task_ids;
        }

        // Anything fed to the solver that neither stayed with its
        // protected robot nor landed in a reassigned itinerary was dropped
        // (e.g. unreachable from every robot) — requeue it instead of
        // losing it.
        let mut dropped = 0usize;
        {
            let mut pending = self.pending_tasks.lock().expect("pending_tasks poisoned");
            for task in &replan.fed_tasks {
                if protected_tasks.contains(&task.id) || reassigned.contains(&task.id.0) {
                    continue;
                }
                dropped += 1;
                pending.push_back(task.clone());
            }
        }

        info!(
            makespan = result.makespan,
            tasks = replan.fed_tasks.len(),
            dropped,
            "background re-plan applied"
        );
    }

    /// One physics-thread tick: bridges L2<->L3, ticks the physics loop,
    /// emits completion events.
    pub fn physics_tick(&self, physics: &mut PhysicsLoop) -> Vec<(u64, u32)> {
        let mut fleet = self.fleet.lock().expect("fleet poisoned");
        fleet.sync_l3_to_l2(&self.nav);
        let completions = fleet.feed_l2_to_l3(&self.nav);
        for &(robot_id, _) in &completions {
            debug!(robot_id, "task completed");
        }
        if !completions.is_empty() {
            self.completed_task_count
                .fetch_add(completions.len() as u64, Ordering::SeqCst);
        }

        physics_tick_drivers(physics, fleet.drivers_mut());

        completions
    }

    pub fn snapshot_telemetry(&self, tick: u64) -> TelemetrySnapshot {
        let fleet = self.fleet.lock().expect("fleet poisoned");
        let robots = fleet
            .members
            .iter()
            .map(|m| RobotTelemetry {
                id: m.agent.id,
                x: m.driver.precise_pos.x,
                y: m.driver.precise_pos.y,
                vx: m.driver.velocity.x,
                vy: m.driver.velocity.y,
                status: format!("{:?}", m.agent.status).to_uppercase(),
                driver_state: format!("{:?}", m.driver.state),
                battery: m.agent.battery_percent,
                has_package: m.waypoints_visited % 2 == 1,
            })
            .collect();
        TelemetrySnapshot {
            tick,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            robots,
        }
    }

    pub fn orca_tick_duration(&self) -> Duration {
        Duration::from_secs_f64(self.config.orca_tick_ms / 1000.0)
    }

    pub fn warehouse_tick_duration(&self) -> Duration {
        Duration::from_secs_f64(self.config.warehouse_tick_ms / 1000.0)
    }
}

/// `PhysicsLoop::run_single_tick` takes `&mut [RobotDriver]` by value
/// ownership of the slice elements; fleet members own their drivers behind
/// `&mut` references, so this helper ticks them one at a time through the
/// same neighbor-aware update the loop uses internally for a `Vec`.
fn physics_tick_drivers(physics: &mut PhysicsLoop, mut drivers: Vec<&mut crate::driving::RobotDriver>) {
    let tick_start = std::time::Instant::now();
    let snapshot: Vec<(u64, crate::geometry::Vec2, crate::geometry::Vec2, f64)> = drivers
        .iter()
        .map(|d| (d.id, d.precise_pos, d.velocity, 3.0))
        .collect();

    for driver in drivers.iter_mut() {
        let neighbors: Vec<crate::driving::Neighbor> = snapshot
            .iter()
            .filter(|(id, pos, _, _)| *id != driver.id && pos.distance(&driver.precise_pos) <= physics.neighbor_radius)
            .map(|(_, pos, vel, radius)| crate::driving::Neighbor {
                position: *pos,
                velocity: *vel,
                radius: *radius,
            })
            .collect();
        driver.update(physics.dt, &neighbors);
    }

    physics.record_external_tick(tick_start.elapsed().as_secs_f64() * 1000.0);
}

/// Builds a `PathService` + `Pathfinder` pair for a fleet sharing one
/// `Grid`.
pub fn build_path_service(grid: Arc<Grid>, pathfinder_step_px: i32) -> Arc<PathService> {
    PathService::new(grid, Pathfinder::new(pathfinder_step_px))
}

pub fn default_driver_config(robot_radius_meters: f64, robot_speed_mps: f64, meters_per_pixel: f64) -> DriverConfig {
    let radius_px = robot_radius_meters / meters_per_pixel;
    let speed_px = robot_speed_mps / meters_per_pixel;
    DriverConfig {
        max_speed: speed_px,
        radius: radius_px,
        ..DriverConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Resolution;
    use crate::mapping::navgraph::Node;
    use crate::mapping::poi::PoiRegistry;
    use crate::planning::{GreedyOnce, TaskId};

    fn chain_nav() -> NavGraph {
        let nodes = (0..4)
            .map(|id| Node {
                id,
                centroid: Coordinates::new(id as i32, 0),
            })
            .collect();
        let mut adj = vec![Vec::new(); 4];
        for i in 0..3 {
            adj[i].push(crate::mapping::navgraph::Edge {
                target_id: i + 1,
                cost: 1.0,
            });
            adj[i + 1].push(crate::mapping::navgraph::Edge {
                target_id: i,
                cost: 1.0,
            });
        }
        NavGraph { nodes, adj }
    }

    fn grid_10() -> Arc<Grid> {
        let mut text = String::from("10 10\n");
        for _ in 0..10 {
            text.push_str(".........."); // 10 chars
            text.push('\n');
        }
        Arc::new(Grid::load_from_str(&text, Resolution::Decimeters, 0.0).unwrap())
    }

    fn make_orchestrator(num_robots: usize) -> Orchestrator {
        let nav = Arc::new(chain_nav());
        let grid = grid_10();
        let mut costs = CostMatrix::new();
        costs.precompute_for(&nav, &[0, 1, 2, 3]);
        let costs = Arc::new(costs);
        let service = build_path_service(grid.clone(), 1);

        let members: Vec<FleetMember> = (0..num_robots)
            .map(|i| {
                FleetMember::new(
                    i as u64 + 1,
                    Coordinates::new(0, 0),
                    0,
                    service.clone(),
                    DriverConfig::default(),
                )
            })
            .collect();
        let fleet = Fleet::new(members);

        Orchestrator::new(
            nav,
            grid,
            costs,
            &PoiRegistry::new(),
            fleet,
            Config {
                batch_threshold: 5,
                ..Config::default()
            },
            BatteryModel::default(),
            Arc::new(GreedyOnce::new(1)),
        )
    }

    fn task(id: u64, src: usize, dst: usize) -> Task {
        Task {
            id: TaskId(id),
            source_node: src,
            dest_node: dst,
            source_id_str: None,
            dest_id_str: None,
        }
    }

    #[test]
    fn initial_tasks_trigger_full_vrp() {
        let orch = make_orchestrator(2);
        orch.seed_tasks(vec![task(1, 0, 1), task(2, 1, 2), task(3, 2, 3)]);
        orch.strategic_tick();

        let fleet = orch.fleet.lock().unwrap();
        let total_assigned: usize = fleet.members.iter().map(|m| m.agent.itinerary.len() / 2).sum();
        assert_eq!(total_assigned, 3);
    }

    #[test]
    fn small_injection_batch_uses_cheap_insertion() {
        let orch = make_orchestrator(2);
        orch.seed_tasks(vec![task(1, 0, 1)]);
        orch.strategic_tick();

        orch.inject_tasks(vec![task(2, 1, 2), task(3, 2, 3)]);
        orch.strategic_tick();

        assert!(orch.background.lock().unwrap().is_none());
        let fleet = orch.fleet.lock().unwrap();
        let total_assigned: usize = fleet.members.iter().map(|m| m.agent.itinerary.len() / 2).sum();
        assert_eq!(total_assigned, 3);
    }

    #[test]
    fn large_injection_batch_spawns_background_replan() {
        let orch = make_orchestrator(2);
        orch.seed_tasks(vec![task(1, 0, 1)]);
        orch.strategic_tick();

        let large_batch: Vec<Task> = (2..10).map(|id| task(id, 0, 1)).collect();
        orch.inject_tasks(large_batch);
        orch.strategic_tick();
        assert!(orch.background.lock().unwrap().is_some());

        // Wait for the spawned thread to complete, then poll within two
        // further strategic ticks.
        std::thread::sleep(Duration::from_millis(50));
        orch.strategic_tick();
        orch.strategic_tick();
        assert!(orch.background.lock().unwrap().is_none());
    }

    #[test]
    fn background_replan_preserves_in_flight_task_and_adds_batch() {
        let orch = make_orchestrator(2);
        orch.seed_tasks(vec![task(1, 0, 1)]);
        orch.strategic_tick();

        // One robot now carries task 1; record which, and its itinerary.
        let (carrier_id, carrier_itinerary, carrier_task_ids) = {
            let fleet = orch.fleet.lock().unwrap();
            let carrier = fleet
                .members
                .iter()
                .find(|m| !m.agent.itinerary.is_empty())
                .expect("one robot should carry task 1");
            (
                carrier.agent.id,
                carrier.agent.itinerary.clone(),
                carrier.agent.assigned_tasks.clone(),
            )
        };
        assert_eq!(carrier_itinerary, vec![0, 1]);
        assert_eq!(carrier_task_ids, vec![TaskId(1)]);

        let large_batch: Vec<Task> = (2..10).map(|id| task(id, 0, 1)).collect();
        orch.inject_tasks(large_batch);
        orch.strategic_tick();
        assert!(orch.background.lock().unwrap().is_some());

        std::thread::sleep(Duration::from_millis(50));
        orch.strategic_tick();
        orch.strategic_tick();
        assert!(orch.background.lock().unwrap().is_none());

        // The carrier's in-flight task must survive the swap untouched: the
        // default battery model makes a single remaining chain-nav leg
        // finish well inside the solver's own runtime estimate, so this
        // robot is protected.
        let fleet = orch.fleet.lock().unwrap();
        let carrier = fleet.members.iter().find(|m| m.agent.id == carrier_id).unwrap();
        assert_eq!(carrier.agent.itinerary, carrier_itinerary);
        assert_eq!(carrier.agent.assigned_tasks, carrier_task_ids);

        // Task 1 was not duplicated onto another robot, and every task fed
        // to the background solve is accounted for either in some fleet
        // member's itinerary or back in pending_tasks (displaced because
        // the solver wanted to hand it to the protected carrier) — never
        // both, and never lost.
        let fleet_task_ids: Vec<u64> = fleet
            .members
            .iter()
            .flat_map(|m| m.agent.assigned_tasks.iter().map(|t| t.0))
            .collect();
        assert_eq!(fleet_task_ids.iter().filter(|&&id| id == 1).count(), 1);

        let pending_ids: Vec<u64> = orch
            .pending_tasks
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.id.0)
            .collect();
        assert!(!pending_ids.contains(&1));

        let mut all_ids: Vec<u64> = fleet_task_ids.iter().chain(pending_ids.iter()).copied().collect();
        all_ids.sort_unstable();
        all_ids.dedup();
        assert_eq!(all_ids, (1..10).collect::<Vec<u64>>());
        assert_eq!(
            fleet_task_ids.len() + pending_ids.len(),
            9,
            "every fed task appears exactly once across itineraries and pending_tasks"
        );
    }

    #[test]
    fn is_all_tasks_complete_true_when_fleet_idle_and_queues_empty() {
        let orch = make_orchestrator(1);
        assert!(orch.is_all_tasks_complete());
    }
}
