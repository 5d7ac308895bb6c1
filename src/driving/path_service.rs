//! PathService (C6): FIFO request queue fronting the Pathfinder.
//! Grounded in
//! `original_source/backend/layer3/include/Pathfinding/PathfindingService.hh`,
//! whose process-wide singleton collapses here to an explicit owned object
//! shared via `Arc`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::geometry::Coordinates;
use crate::mapping::grid::Grid;

use super::pathfinder::{PathResult, Pathfinder};

struct Request {
    start: Coordinates,
    end: Coordinates,
    respond: Box<dyn FnOnce(PathResult) + Send>,
}

/// Owns a FIFO queue of path requests. `process_next` is serialized by the
/// internal mutex so reentrancy can't interleave two searches against the
/// shared grid.
pub struct PathService {
    grid: Arc<Grid>,
    pathfinder: Pathfinder,
    queue: Mutex<VecDeque<Request>>,
}

impl PathService {
    pub fn new(grid: Arc<Grid>, pathfinder: Pathfinder) -> Arc<Self> {
        Arc::new(PathService {
            grid,
            pathfinder,
            queue: Mutex::new(VecDeque::new()),
        })
    }

    pub fn enqueue(&self, start: Coordinates, end: Coordinates, respond: impl FnOnce(PathResult) + Send + 'static) {
        let mut queue = self.queue.lock().expect("path service queue poisoned");
        queue.push_back(Request {
            start,
            end,
            respond: Box::new(respond),
        });
    }

    /// Pops and services exactly one request, if any is queued.
    pub fn process_next(&self) -> bool {
        let request = {
            let mut queue = self.queue.lock().expect("path service queue poisoned");
            queue.pop_front()
        };
        match request {
            Some(request) => {
                let result = self.pathfinder.find_path(&self.grid, request.start, request.end);
                (request.respond)(result);
                true
            }
            None => false,
        }
    }

    /// Enqueues a request and blocks the calling thread until it completes.
    pub fn request_sync(&self, start: Coordinates, end: Coordinates) -> PathResult {
        let (tx, rx) = std::sync::mpsc::channel();
        self.enqueue(start, end, move |result| {
            let _ = tx.send(result);
        });
        // Drivers poll; in the absence of a separate worker thread, the
        // caller services its own request (and any ahead of it) directly.
        loop {
            if let Ok(result) = rx.try_recv() {
                return result;
            }
            if !self.process_next() {
                // Queue was drained by someone else between enqueue and here;
                // wait for the result to arrive.
                if let Ok(result) = rx.recv() {
                    return result;
                }
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.queue.lock().expect("path service queue poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Resolution;

    fn empty_grid(n: usize) -> Arc<Grid> {
        let mut text = format!("{n} {n}\n");
        for _ in 0..n {
            text.push_str(&".".repeat(n));
            text.push('\n');
        }
        Arc::new(Grid::load_from_str(&text, Resolution::Decimeters, 0.0).unwrap())
    }

    #[test]
    fn request_sync_returns_a_successful_path() {
        let service = PathService::new(empty_grid(10), Pathfinder::new(1));
        let result = service.request_sync(Coordinates::new(0, 0), Coordinates::new(9, 9));
        assert!(result.success);
    }

    #[test]
    fn fifo_order_is_respected() {
        let service = PathService::new(empty_grid(10), Pathfinder::new(1));
        let order = Arc::new(Mutex::new(Vec::new()));

        let order1 = order.clone();
        service.enqueue(Coordinates::new(0, 0), Coordinates::new(1, 1), move |_| {
            order1.lock().unwrap().push(1);
        });
        let order2 = order.clone();
        service.enqueue(Coordinates::new(0, 0), Coordinates::new(2, 2), move |_| {
            order2.lock().unwrap().push(2);
        });

        assert!(service.process_next());
        assert!(service.process_next());
        assert!(!service.process_next());
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }
}
