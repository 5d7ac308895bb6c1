//! Layer M (Mapping): grid, navigation graph, POI registry, cost matrix.

pub mod cost_matrix;
pub mod grid;
pub mod navgraph;
pub mod poi;

pub use cost_matrix::CostMatrix;
pub use grid::Grid;
pub use navgraph::NavGraph;
pub use poi::{Poi, PoiKind, PoiRegistry};
