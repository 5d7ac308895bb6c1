//! JSON ingest: POI registries and task batches.

pub mod poi;
pub mod task;

pub use poi::{load_poi_file, load_poi_json};
pub use task::{load_task_file, load_task_json};
