//! System configuration (C13): parameter bundle + JSON loader.

use serde::Deserialize;
use std::path::Path;

use crate::errors::ConfigError;
use crate::geometry::Resolution;

/// Recognized configuration options and their effects.
#[derive(Debug, Clone)]
pub struct Config {
    pub orca_tick_ms: f64,
    pub warehouse_tick_ms: f64,
    pub obstacle_tick_ms: f64,
    pub robot_radius_meters: f64,
    pub robot_speed_mps: f64,
    pub map_resolution: Resolution,
    pub map_path: Option<String>,
    pub poi_config_path: Option<String>,
    pub task_path: Option<String>,
    pub num_robots: usize,
    pub batch_mode: bool,
    pub batch_threshold: usize,
    pub estimated_replan_time_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            orca_tick_ms: 50.0,
            warehouse_tick_ms: 1000.0,
            obstacle_tick_ms: 1000.0,
            robot_radius_meters: 0.3,
            robot_speed_mps: 1.6,
            map_resolution: Resolution::Decimeters,
            map_path: None,
            poi_config_path: None,
            task_path: None,
            num_robots: 0,
            batch_mode: false,
            batch_threshold: 5,
            estimated_replan_time_ms: 100,
        }
    }
}

/// Raw JSON shape. Every field is optional; absent keys fall back to
/// `Config::default()`, but a present key with the wrong type is a hard
/// `ConfigError` — we don't silently coerce.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(rename = "orcaTickMs")]
    orca_tick_ms: Option<f64>,
    #[serde(rename = "warehouseTickMs")]
    warehouse_tick_ms: Option<f64>,
    #[serde(rename = "obstacleTickMs")]
    obstacle_tick_ms: Option<f64>,
    #[serde(rename = "robotRadiusMeters")]
    robot_radius_meters: Option<f64>,
    #[serde(rename = "robotSpeedMps")]
    robot_speed_mps: Option<f64>,
    #[serde(rename = "mapResolution")]
    map_resolution: Option<String>,
    #[serde(rename = "mapPath")]
    map_path: Option<String>,
    #[serde(rename = "poiConfigPath")]
    poi_config_path: Option<String>,
    #[serde(rename = "taskPath")]
    task_path: Option<String>,
    #[serde(rename = "numRobots")]
    num_robots: Option<usize>,
    #[serde(rename = "batchMode")]
    batch_mode: Option<bool>,
    #[serde(rename = "batchThreshold")]
    batch_threshold: Option<usize>,
    #[serde(rename = "estimatedReplanTimeMs")]
    estimated_replan_time_ms: Option<u64>,
}

impl Config {
    pub fn from_json_str(contents: &str) -> Result<Config, ConfigError> {
        let raw: RawConfig = serde_json::from_str(contents)?;
        let mut cfg = Config::default();

        if let Some(v) = raw.orca_tick_ms {
            cfg.orca_tick_ms = v;
        }
        if let Some(v) = raw.warehouse_tick_ms {
            cfg.warehouse_tick_ms = v;
        }
        if let Some(v) = raw.obstacle_tick_ms {
            cfg.obstacle_tick_ms = v;
        }
        if let Some(v) = raw.robot_radius_meters {
            cfg.robot_radius_meters = v;
        }
        if let Some(v) = raw.robot_speed_mps {
            cfg.robot_speed_mps = v;
        }
        if let Some(s) = raw.map_resolution {
            cfg.map_resolution =
                Resolution::parse(&s).ok_or_else(|| ConfigError::UnknownResolution(s))?;
        }
        cfg.map_path = raw.map_path;
        cfg.poi_config_path = raw.poi_config_path;
        cfg.task_path = raw.task_path;
        if let Some(v) = raw.num_robots {
            cfg.num_robots = v;
        }
        if let Some(v) = raw.batch_mode {
            cfg.batch_mode = v;
        }
        if let Some(v) = raw.batch_threshold {
            cfg.batch_threshold = v;
        }
        if let Some(v) = raw.estimated_replan_time_ms {
            cfg.estimated_replan_time_ms = v;
        }

        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Config::from_json_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.orca_tick_ms, 50.0);
        assert_eq!(cfg.warehouse_tick_ms, 1000.0);
        assert_eq!(cfg.batch_threshold, 5);
        assert_eq!(cfg.estimated_replan_time_ms, 100);
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let cfg = Config::from_json_str(r#"{"numRobots": 4, "batchMode": true}"#).unwrap();
        assert_eq!(cfg.num_robots, 4);
        assert!(cfg.batch_mode);
        assert_eq!(cfg.orca_tick_ms, 50.0);
    }

    #[test]
    fn unknown_resolution_is_an_error() {
        let err = Config::from_json_str(r#"{"mapResolution": "FURLONGS"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownResolution(_)));
    }

    #[test]
    fn unknown_key_is_an_error() {
        let err = Config::from_json_str(r#"{"numRobots": 4, "bogusKey": true}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
