//! amr-fleet: a warehouse AMR fleet orchestrator — grid/nav/POI mapping,
//! any-angle pathfinding and local collision avoidance, multi-strategy VRP
//! planning, and the strategic/physics/obstacle orchestrator threads tying
//! them together.

pub mod config;
pub mod driving;
pub mod errors;
pub mod geometry;
pub mod ingest;
pub mod mapping;
pub mod orchestrator;
pub mod planning;
