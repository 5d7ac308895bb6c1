//! LocalAvoidance (C7): simplified reciprocal velocity-level collision
//! avoidance. Grounded in
//! `original_source/backend/layer3/include/Physics/ORCASolver.hh`, reduced
//! to a non-reciprocal "soft repulsion + braking" model rather than full
//! ORCA half-plane optimization.

use crate::geometry::Vec2;

#[derive(Debug, Clone, Copy)]
pub struct Neighbor {
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct AvoidanceParams {
    pub safety_margin: f64,
    pub time_horizon: f64,
    pub max_speed: f64,
    pub responsiveness: f64,
    pub stop_distance: f64,
    pub slowdown_distance: f64,
}

impl Default for AvoidanceParams {
    fn default() -> Self {
        AvoidanceParams {
            safety_margin: 1.0,
            time_horizon: 1.0,
            max_speed: 16.0,
            responsiveness: 1.0,
            stop_distance: 2.0,
            slowdown_distance: 8.0,
        }
    }
}

/// Corrects `v_pref` against the given neighbors, returning the velocity to
/// actually integrate this tick.
pub fn compute_velocity(
    position: Vec2,
    radius: f64,
    v_pref: Vec2,
    neighbors: &[Neighbor],
    params: &AvoidanceParams,
) -> Vec2 {
    if neighbors.is_empty() {
        return v_pref.clamped_length(params.max_speed);
    }

    // (i) distance to the nearest neighbor's surface.
    let nearest_surface_distance = neighbors
        .iter()
        .map(|n| (position.distance(&n.position) - radius - n.radius).max(0.0))
        .fold(f64::INFINITY, f64::min);

    // (ii) hard stop when too close.
    if nearest_surface_distance < params.stop_distance {
        return Vec2::ZERO;
    }

    // (iii) linear slowdown between stop and slowdown distances.
    let mut velocity = if nearest_surface_distance < params.slowdown_distance {
        let span = (params.slowdown_distance - params.stop_distance).max(f64::EPSILON);
        let t = (nearest_surface_distance - params.stop_distance) / span;
        v_pref.scaled(t.clamp(0.0, 1.0))
    } else {
        v_pref
    };

    // (iv) soft repulsion vector, summed over all neighbors.
    let mut repulsion = Vec2::ZERO;
    for n in neighbors {
        let delta = position - n.position;
        let dist = delta.length().max(f64::EPSILON);
        let weight = 1.0 / (dist * dist);
        repulsion = repulsion + delta.normalized().scaled(weight);
    }
    velocity = velocity + repulsion.scaled(params.responsiveness);

    // (v) clamp to max speed.
    velocity.clamped_length(params.max_speed)
}
