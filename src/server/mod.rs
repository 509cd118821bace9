pub mod metrics;

pub use metrics::{LoginCounter, Metrics, MetricsSnapshot};
