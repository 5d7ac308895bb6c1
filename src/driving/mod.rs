//! Layer D (Driving): tactical drivers, local avoidance, fixed-rate physics.

pub mod driver;
pub mod local_avoidance;
pub mod path_service;
pub mod pathfinder;
pub mod physics;

pub use driver::{DriverConfig, DriverState, RobotDriver};
pub use local_avoidance::{AvoidanceParams, Neighbor};
pub use path_service::PathService;
pub use pathfinder::{PathResult, Pathfinder};
pub use physics::PhysicsLoop;
