//! Neighborhood moves shared by Tabu Search, Simulated Annealing and Hill
//! Climbing. Grounded in
//! `solver/tabu_search/neighborhood.rs` (candidate generation over a
//! current solution), generalized from single-swap to Transfer/Swap/Reorder
//! moves across robot routes.

use rand::Rng;

use crate::mapping::cost_matrix::CostMatrix;

use super::solver::Solution;
use super::task::{RobotAgent, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    /// Move the task at `(from_robot, from_pos)` to `(to_robot, to_pos)`.
    Transfer {
        from_robot: usize,
        from_pos: usize,
        to_robot: usize,
        to_pos: usize,
    },
    /// Exchange the tasks at `(robot_a, pos_a)` and `(robot_b, pos_b)`.
    Swap {
        robot_a: usize,
        pos_a: usize,
        robot_b: usize,
        pos_b: usize,
    },
    /// Swap the order of two tasks within the same robot's route.
    Reorder {
        robot: usize,
        pos_a: usize,
        pos_b: usize,
    },
}

impl Move {
    /// The move that undoes `self`, used to populate the tabu list with
    /// *reverse* moves.
    pub fn reverse(&self) -> Move {
        match *self {
            Move::Transfer {
                from_robot,
                from_pos,
                to_robot,
                to_pos,
            } => Move::Transfer {
                from_robot: to_robot,
                from_pos: to_pos,
                to_robot: from_robot,
                to_pos: from_pos,
            },
            Move::Swap {
                robot_a,
                pos_a,
                robot_b,
                pos_b,
            } => Move::Swap {
                robot_a: robot_b,
                pos_a: pos_b,
                robot_b: robot_a,
                pos_b: pos_a,
            },
            Move::Reorder {
                robot,
                pos_a,
                pos_b,
            } => Move::Reorder {
                robot,
                pos_a: pos_b,
                pos_b: pos_a,
            },
        }
    }
}

pub fn apply_move(solution: &Solution, mv: Move) -> Solution {
    let mut routes = solution.routes.clone();
    match mv {
        Move::Transfer {
            from_robot,
            from_pos,
            to_robot,
            to_pos,
        } => {
            if from_pos >= routes[from_robot].len() {
                return solution.clone();
            }
            let task = routes[from_robot].remove(from_pos);
            let to_pos = to_pos.min(routes[to_robot].len());
            routes[to_robot].insert(to_pos, task);
        }
        Move::Swap {
            robot_a,
            pos_a,
            robot_b,
            pos_b,
        } => {
            if pos_a >= routes[robot_a].len() || pos_b >= routes[robot_b].len() {
                return solution.clone();
            }
            let task_a = routes[robot_a][pos_a];
            let task_b = routes[robot_b][pos_b];
            routes[robot_a][pos_a] = task_b;
            routes[robot_b][pos_b] = task_a;
        }
        Move::Reorder {
            robot,
            pos_a,
            pos_b,
        } => {
            if pos_a >= routes[robot].len() || pos_b >= routes[robot].len() {
                return solution.clone();
            }
            routes[robot].swap(pos_a, pos_b);
        }
    }
    Solution { routes }
}

/// Enumerates every inter-robot transfer, inter-robot swap and intra-robot
/// reorder reachable from `solution` — used by Hill Climbing's exhaustive
/// scan.
pub fn all_moves(solution: &Solution) -> Vec<Move> {
    let n = solution.routes.len();
    let mut moves = Vec::new();

    for from_robot in 0..n {
        for from_pos in 0..solution.routes[from_robot].len() {
            for to_robot in 0..n {
                if to_robot == from_robot {
                    continue;
                }
                for to_pos in 0..=solution.routes[to_robot].len() {
                    moves.push(Move::Transfer {
                        from_robot,
                        from_pos,
                        to_robot,
                        to_pos,
                    });
                }
            }
        }
    }

    for robot_a in 0..n {
        for pos_a in 0..solution.routes[robot_a].len() {
            for robot_b in (robot_a + 1)..n {
                for pos_b in 0..solution.routes[robot_b].len() {
                    moves.push(Move::Swap {
                        robot_a,
                        pos_a,
                        robot_b,
                        pos_b,
                    });
                }
            }
            for pos_b in (pos_a + 1)..solution.routes[robot_a].len() {
                moves.push(Move::Reorder {
                    robot: robot_a,
                    pos_a,
                    pos_b,
                });
            }
        }
    }

    moves
}

/// Samples `k` random moves of the three kinds, used by Tabu Search and
/// Simulated Annealing instead of the full exhaustive scan.
pub fn sample_moves(solution: &Solution, k: usize, rng: &mut impl Rng) -> Vec<Move> {
    let n = solution.routes.len();
    if n == 0 {
        return Vec::new();
    }
    let mut moves = Vec::with_capacity(k);
    for _ in 0..k {
        match rng.gen_range(0..3) {
            0 => {
                let from_robot = rng.gen_range(0..n);
                if solution.routes[from_robot].is_empty() {
                    continue;
                }
                let from_pos = rng.gen_range(0..solution.routes[from_robot].len());
                let to_robot = rng.gen_range(0..n);
                let to_pos = if solution.routes[to_robot].is_empty() {
                    0
                } else {
                    rng.gen_range(0..=solution.routes[to_robot].len())
                };
                moves.push(Move::Transfer {
                    from_robot,
                    from_pos,
                    to_robot,
                    to_pos,
                });
            }
            1 => {
                let robot_a = rng.gen_range(0..n);
                let robot_b = rng.gen_range(0..n);
                if solution.routes[robot_a].is_empty() || solution.routes[robot_b].is_empty() {
                    continue;
                }
                let pos_a = rng.gen_range(0..solution.routes[robot_a].len());
                let pos_b = rng.gen_range(0..solution.routes[robot_b].len());
                moves.push(Move::Swap {
                    robot_a,
                    pos_a,
                    robot_b,
                    pos_b,
                });
            }
            _ => {
                let robot = rng.gen_range(0..n);
                if solution.routes[robot].len() < 2 {
                    continue;
                }
                let pos_a = rng.gen_range(0..solution.routes[robot].len());
                let pos_b = rng.gen_range(0..solution.routes[robot].len());
                if pos_a == pos_b {
                    continue;
                }
                moves.push(Move::Reorder {
                    robot,
                    pos_a,
                    pos_b,
                });
            }
        }
    }
    moves
}

pub fn makespan_of(
    solution: &Solution,
    tasks: &[Task],
    robots: &[RobotAgent],
    costs: &CostMatrix,
) -> f64 {
    solution.makespan(tasks, robots, costs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Coordinates;
    use crate::mapping::navgraph::{Edge, Node, NavGraph};
    use crate::planning::task::{RobotAgent, Task, TaskId};

    fn sample_solution() -> Solution {
        Solution {
            routes: vec![vec![0, 1], vec![2]],
        }
    }

    #[test]
    fn transfer_moves_task_between_routes() {
        let sol = sample_solution();
        let moved = apply_move(
            &sol,
            Move::Transfer {
                from_robot: 0,
                from_pos: 0,
                to_robot: 1,
                to_pos: 0,
            },
        );
        assert_eq!(moved.routes[0], vec![1]);
        assert_eq!(moved.routes[1], vec![0, 2]);
    }

    #[test]
    fn swap_exchanges_tasks() {
        let sol = sample_solution();
        let moved = apply_move(
            &sol,
            Move::Swap {
                robot_a: 0,
                pos_a: 0,
                robot_b: 1,
                pos_b: 0,
            },
        );
        assert_eq!(moved.routes[0], vec![2, 1]);
        assert_eq!(moved.routes[1], vec![0]);
    }

    #[test]
    fn reorder_swaps_within_same_route() {
        let sol = sample_solution();
        let moved = apply_move(
            &sol,
            Move::Reorder {
                robot: 0,
                pos_a: 0,
                pos_b: 1,
            },
        );
        assert_eq!(moved.routes[0], vec![1, 0]);
    }

    #[test]
    fn reverse_move_undoes_transfer() {
        let sol = sample_solution();
        let mv = Move::Transfer {
            from_robot: 0,
            from_pos: 0,
            to_robot: 1,
            to_pos: 0,
        };
        let moved = apply_move(&sol, mv);
        let restored = apply_move(&moved, mv.reverse());
        assert_eq!(restored.routes[0], sol.routes[0]);
        assert_eq!(restored.routes[1], sol.routes[1]);
    }

    #[test]
    fn all_moves_nonempty_for_multi_robot_solution() {
        let moves = all_moves(&sample_solution());
        assert!(!moves.is_empty());
    }

    fn tiny_nav_and_costs() -> (NavGraph, CostMatrix) {
        let nodes = (0..3)
            .map(|id| Node {
                id,
                centroid: Coordinates::new(id as i32, 0),
            })
            .collect();
        let mut adj = vec![Vec::new(); 3];
        for i in 0..2 {
            adj[i].push(Edge {
                target_id: i + 1,
                cost: 1.0,
            });
            adj[i + 1].push(Edge {
                target_id: i,
                cost: 1.0,
            });
        }
        let nav = NavGraph { nodes, adj };
        let mut cm = CostMatrix::new();
        cm.precompute_for(&nav, &[0, 1, 2]);
        (nav, cm)
    }

    #[test]
    fn makespan_of_matches_solution_makespan() {
        let (_, costs) = tiny_nav_and_costs();
        let robots = vec![RobotAgent::new(1, 0)];
        let tasks = vec![Task {
            id: TaskId(1),
            source_node: 0,
            dest_node: 1,
            source_id_str: None,
            dest_id_str: None,
        }];
        let sol = Solution {
            routes: vec![vec![0]],
        };
        assert_eq!(
            makespan_of(&sol, &tasks, &robots, &costs),
            sol.makespan(&tasks, &robots, &costs)
        );
    }
}
