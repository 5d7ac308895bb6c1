//! Typed error taxonomy. Each layer returns its own variant;
//! only the orchestrator decides what is fatal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown resolution '{0}', expected one of METERS|DECIMETERS|CENTIMETERS|MILLIMETERS")]
    UnknownResolution(String),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("i/o error loading bitmap: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse bitmap: {0}")]
    Parse(String),
    #[error("bitmap is empty (width or height is zero)")]
    EmptyGrid,
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("grid has no free cells to decompose into a navigation graph")]
    EmptyGrid,
    #[error("navigation graph has no connected component reachable from node 0")]
    Disconnected,
}

#[derive(Debug, Error)]
pub enum POIError {
    #[error("duplicate POI id '{0}', entry skipped")]
    DuplicateId(String),
    #[error("POI '{0}' is not safely accessible and was disabled")]
    Unsafe(String),
    #[error("POI '{0}' has no node within max_distance")]
    TooFar(String),
    #[error("expected a 'poi', 'pois' or 'points_of_interest' array in POI JSON")]
    MissingArray,
    #[error("failed to parse POI JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("i/o error loading POI file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PathError {
    #[error("no path exists between the requested start and goal")]
    NoPath,
    #[error("start or goal coordinate is outside the grid bounds")]
    OutOfBounds,
}

#[derive(Debug, Error)]
pub enum VRPError {
    #[error("no feasible assignment exists for the given tasks and robots")]
    Infeasible,
    #[error("no robots available to assign tasks to")]
    NoRobots,
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("i/o error writing telemetry: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize telemetry snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum InternalError {
    #[error("a shared lock was poisoned by a panicking thread")]
    LockPoisoned,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Poi(#[from] POIError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Internal(#[from] InternalError),
}
