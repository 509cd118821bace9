use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Timeouts and limits for a framed connection.
///
/// Timeouts are in milliseconds; `0` disables the respective timeout.
///
/// ```json
/// { "read_timeout_ms": 300000, "first_frame_timeout_ms": 10000, "max_payload_size": 65536 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Idle timeout applied to every single read once the first frame is in
    pub read_timeout_ms: u64,
    /// Total time allowed to receive the first frame (login phase)
    pub first_frame_timeout_ms: u64,
    /// Largest payload a server accepts; `None` means unlimited
    pub max_payload_size: Option<usize>,
}

impl FramingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_first_frame_timeout(mut self, timeout: Duration) -> Self {
        self.first_frame_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = Some(max);
        self
    }

    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        millis(self.read_timeout_ms)
    }

    pub fn first_frame_timeout(&self) -> Option<Duration> {
        millis(self.first_frame_timeout_ms)
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
