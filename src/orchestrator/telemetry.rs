//! TelemetrySink (C12): contract plus a file-backed implementation (spec
//! §4.12, SPEC_FULL §4.14): write a snapshot out at a throttled cadence,
//! logging but never failing the run on an I/O error.

use serde::Serialize;
use std::io::Write;
use tracing::warn;

use crate::errors::TelemetryError;

#[derive(Debug, Clone, Serialize)]
pub struct RobotTelemetry {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub status: String,
    #[serde(rename = "driverState")]
    pub driver_state: String,
    pub battery: f64,
    #[serde(rename = "hasPackage")]
    pub has_package: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub tick: u64,
    #[serde(rename = "timestampMs")]
    pub timestamp_ms: i64,
    pub robots: Vec<RobotTelemetry>,
}

/// Durable sink for telemetry snapshots. The contract is intentionally
/// narrow — implementations decide how and where a snapshot lands (spec
/// §4.12 "contract only").
pub trait TelemetrySink: Send {
    fn publish(&mut self, snapshot: &TelemetrySnapshot) -> Result<(), TelemetryError>;
}

/// Appends one JSON line per snapshot to a file. I/O errors are logged, not
/// propagated — telemetry must never take the physics thread down (spec
/// §5 "Resource policy").
pub struct FileTelemetrySink {
    file: std::fs::File,
}

impl FileTelemetrySink {
    pub fn create(path: impl AsRef<std::path::Path>) -> Result<Self, TelemetryError> {
        let file = std::fs::File::create(path)?;
        Ok(FileTelemetrySink { file })
    }
}

impl TelemetrySink for FileTelemetrySink {
    fn publish(&mut self, snapshot: &TelemetrySnapshot) -> Result<(), TelemetryError> {
        let line = serde_json::to_string(snapshot)?;
        writeln!(self.file, "{line}")?;
        Ok(())
    }
}

/// Wraps any `TelemetrySink`, swallowing and logging errors so a faulty
/// sink never propagates into the physics loop.
pub fn publish_lossy(sink: &mut dyn TelemetrySink, snapshot: &TelemetrySnapshot) {
    if let Err(err) = sink.publish(snapshot) {
        warn!(error = %err, "telemetry publish failed");
    }
}
