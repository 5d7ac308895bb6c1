//! RobotDriver (C8): per-robot goal -> path -> waypoint -> velocity state
//! machine. Grounded in
//! `original_source/backend/layer3/include/Core/RobotDriver.hh`.

use std::sync::Arc;

use crate::geometry::{Coordinates, Vec2};
use crate::mapping::navgraph::NavGraph;

use super::local_avoidance::{compute_velocity, AvoidanceParams, Neighbor};
use super::path_service::PathService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    ComputingPath,
    Moving,
    Arrived,
    Stuck,
    CollisionWait,
}

#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    pub max_speed: f64,
    pub accel: f64,
    pub waypoint_threshold: f64,
    pub goal_threshold: f64,
    pub radius: f64,
    pub avoidance: AvoidanceParams,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            max_speed: 16.0,
            accel: 8.0,
            waypoint_threshold: 5.0,
            goal_threshold: 3.0,
            radius: 3.0,
            avoidance: AvoidanceParams::default(),
        }
    }
}

pub struct RobotDriver {
    pub id: u64,
    pub precise_pos: Vec2,
    pub velocity: Vec2,
    pub goal_node_id: Option<usize>,
    pub path: Vec<Coordinates>,
    pub path_index: usize,
    pub state: DriverState,
    config: DriverConfig,
    path_service: Arc<PathService>,
    /// Filled in by the orchestrator after an ARRIVED transition, consumed
    /// by whoever polls `take_arrival_event`.
    arrival_event: Option<usize>,
}

impl RobotDriver {
    pub fn new(id: u64, start: Coordinates, path_service: Arc<PathService>, config: DriverConfig) -> Self {
        RobotDriver {
            id,
            precise_pos: Vec2::from_coords(start),
            velocity: Vec2::ZERO,
            goal_node_id: None,
            path: Vec::new(),
            path_index: 0,
            state: DriverState::Idle,
            config,
            path_service,
            arrival_event: None,
        }
    }

    pub fn integer_pos(&self) -> Coordinates {
        self.precise_pos.to_coords()
    }

    /// Rejected with `Err` if `node` does not exist in `nav`.
    pub fn set_goal(&mut self, nav: &NavGraph, node: usize) -> Result<(), String> {
        if node >= nav.node_count() {
            return Err(format!("node {node} does not exist in NavGraph"));
        }
        self.goal_node_id = Some(node);
        self.state = DriverState::ComputingPath;

        let centroid = nav.nodes[node].centroid;
        let result = self.path_service.request_sync(self.integer_pos(), centroid);
        if result.success {
            self.path = result.path;
            self.path_index = 0;
            self.state = DriverState::Moving;
        } else {
            self.path = Vec::new();
            self.state = DriverState::Stuck;
        }
        Ok(())
    }

    pub fn cancel_goal(&mut self) {
        self.goal_node_id = None;
        self.path.clear();
        self.path_index = 0;
        self.velocity = Vec2::ZERO;
        self.state = DriverState::Idle;
    }

    pub fn take_arrival_event(&mut self) -> Option<usize> {
        self.arrival_event.take()
    }

    /// Advances the driver by one physics tick.
    pub fn update(&mut self, dt: f64, neighbors: &[Neighbor]) {
        match self.state {
            DriverState::Idle | DriverState::Stuck => {
                self.velocity = Vec2::ZERO;
            }
            DriverState::CollisionWait => {
                self.velocity = Vec2::ZERO;
            }
            DriverState::Moving => self.step_moving(dt, neighbors),
            DriverState::ComputingPath | DriverState::Arrived => {}
        }
    }

    fn step_moving(&mut self, dt: f64, neighbors: &[Neighbor]) {
        if self.path.is_empty() {
            self.state = DriverState::Stuck;
            return;
        }

        let target = Vec2::from_coords(self.path[self.path_index]);
        let to_target = target - self.precise_pos;
        let is_final_waypoint = self.path_index == self.path.len() - 1;
        let threshold = if is_final_waypoint {
            self.config.goal_threshold
        } else {
            self.config.waypoint_threshold
        };

        if to_target.length() < threshold {
            if is_final_waypoint {
                self.velocity = Vec2::ZERO;
                self.state = DriverState::Arrived;
                self.arrival_event = self.goal_node_id;
                return;
            }
            self.path_index += 1;
        }

        let target = Vec2::from_coords(self.path[self.path_index]);
        let v_pref = (target - self.precise_pos)
            .normalized()
            .scaled(self.config.max_speed);

        let avoided = compute_velocity(
            self.precise_pos,
            self.config.radius,
            v_pref,
            neighbors,
            &self.config.avoidance,
        );

        // Bounded acceleration toward the avoidance-corrected velocity.
        let delta_v = avoided - self.velocity;
        let max_delta = self.config.accel * dt;
        self.velocity = if delta_v.length() > max_delta {
            self.velocity + delta_v.normalized().scaled(max_delta)
        } else {
            avoided
        };

        self.precise_pos = self.precise_pos + self.velocity.scaled(dt);
    }
}
