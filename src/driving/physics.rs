//! PhysicsLoop (C9): fixed-rate tick driving all drivers, neighbor discovery
//!. Grounded in
//! `original_source/backend/layer3/include/Core/FastLoopManager.hh`.

use tracing::trace;

use super::driver::RobotDriver;
use super::local_avoidance::Neighbor;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoopStats {
    pub tick_count: u64,
    pub total_time_s: f64,
    pub avg_tick_ms: f64,
    pub max_tick_ms: f64,
}

pub struct PhysicsLoop {
    pub dt: f64,
    pub neighbor_radius: f64,
    stats: LoopStats,
    on_tick: Option<Box<dyn FnMut(u64, f64) + Send>>,
}

impl PhysicsLoop {
    pub fn new(dt: f64, neighbor_radius: f64) -> Self {
        PhysicsLoop {
            dt,
            neighbor_radius,
            stats: LoopStats::default(),
            on_tick: None,
        }
    }

    pub fn set_on_tick(&mut self, callback: impl FnMut(u64, f64) + Send + 'static) {
        self.on_tick = Some(Box::new(callback));
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Runs exactly one tick. Neighbor lists are built from a read-only
    /// snapshot taken before any driver is updated, so all drivers observe
    /// the same pre-tick positions.
    pub fn run_single_tick(&mut self, drivers: &mut [RobotDriver]) {
        let tick_start = std::time::Instant::now();

        let snapshot: Vec<(u64, crate::geometry::Vec2, crate::geometry::Vec2, f64)> = drivers
            .iter()
            .map(|d| (d.id, d.precise_pos, d.velocity, 3.0))
            .collect();

        for driver in drivers.iter_mut() {
            let neighbors: Vec<Neighbor> = snapshot
                .iter()
                .filter(|(id, pos, _, _)| *id != driver.id && pos.distance(&driver.precise_pos) <= self.neighbor_radius)
                .map(|(_, pos, vel, radius)| Neighbor {
                    position: *pos,
                    velocity: *vel,
                    radius: *radius,
                })
                .collect();

            driver.update(self.dt, &neighbors);
        }

        self.stats.tick_count += 1;
        self.stats.total_time_s += self.dt;
        let tick_ms = tick_start.elapsed().as_secs_f64() * 1000.0;
        self.stats.max_tick_ms = self.stats.max_tick_ms.max(tick_ms);
        let n = self.stats.tick_count as f64;
        self.stats.avg_tick_ms = ((self.stats.avg_tick_ms * (n - 1.0)) + tick_ms) / n;

        trace!(tick = self.stats.tick_count, tick_ms, "physics tick complete");

        if let Some(callback) = self.on_tick.as_mut() {
            callback(self.stats.tick_count, self.dt);
        }
    }

    /// Records bookkeeping for a tick driven externally (the Orchestrator
    /// ticks fleet drivers one at a time since they aren't laid out as a
    /// contiguous `&mut [RobotDriver]`) using the same neighbor-radius
    /// snapshot rule as [`run_single_tick`](Self::run_single_tick).
    pub fn record_external_tick(&mut self, tick_ms: f64) {
        self.stats.tick_count += 1;
        self.stats.total_time_s += self.dt;
        self.stats.max_tick_ms = self.stats.max_tick_ms.max(tick_ms);
        let n = self.stats.tick_count as f64;
        self.stats.avg_tick_ms = ((self.stats.avg_tick_ms * (n - 1.0)) + tick_ms) / n;
        trace!(tick = self.stats.tick_count, tick_ms, "physics tick complete (external)");
        if let Some(callback) = self.on_tick.as_mut() {
            callback(self.stats.tick_count, self.dt);
        }
    }

    pub fn run_ticks(&mut self, drivers: &mut [RobotDriver], n: u64) {
        for _ in 0..n {
            self.run_single_tick(drivers);
        }
    }

    pub fn run_for_duration(&mut self, drivers: &mut [RobotDriver], seconds: f64) {
        let ticks = (seconds / self.dt).round() as u64;
        self.run_ticks(drivers, ticks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driving::driver::DriverConfig;
    use crate::driving::path_service::PathService;
    use crate::driving::pathfinder::Pathfinder;
    use crate::geometry::{Coordinates, Resolution};
    use crate::mapping::grid::Grid;
    use std::sync::Arc;

    fn empty_grid(n: usize) -> Arc<Grid> {
        let mut text = format!("{n} {n}\n");
        for _ in 0..n {
            text.push_str(&".".repeat(n));
            text.push('\n');
        }
        Arc::new(Grid::load_from_str(&text, Resolution::Decimeters, 0.0).unwrap())
    }

    #[test]
    fn run_ticks_advances_tick_count() {
        let service = PathService::new(empty_grid(10), Pathfinder::new(1));
        let mut drivers = vec![RobotDriver::new(
            1,
            Coordinates::new(0, 0),
            service,
            DriverConfig::default(),
        )];
        let mut physics = PhysicsLoop::new(0.05, 20.0);
        physics.run_ticks(&mut drivers, 5);
        assert_eq!(physics.stats().tick_count, 5);
    }

    #[test]
    fn on_tick_callback_fires_once_per_tick() {
        let service = PathService::new(empty_grid(10), Pathfinder::new(1));
        let mut drivers = vec![RobotDriver::new(
            1,
            Coordinates::new(0, 0),
            service,
            DriverConfig::default(),
        )];
        let mut physics = PhysicsLoop::new(0.05, 20.0);
        let count = Arc::new(std::sync::Mutex::new(0u64));
        let count_clone = count.clone();
        physics.set_on_tick(move |_tick, _dt| {
            *count_clone.lock().unwrap() += 1;
        });
        physics.run_ticks(&mut drivers, 3);
        assert_eq!(*count.lock().unwrap(), 3);
    }

    #[test]
    fn idle_drivers_do_not_move() {
        let service = PathService::new(empty_grid(10), Pathfinder::new(1));
        let mut drivers = vec![RobotDriver::new(
            1,
            Coordinates::new(5, 5),
            service,
            DriverConfig::default(),
        )];
        let mut physics = PhysicsLoop::new(0.05, 20.0);
        physics.run_ticks(&mut drivers, 10);
        assert_eq!(drivers[0].precise_pos, crate::geometry::Vec2::new(5.0, 5.0));
    }
}
