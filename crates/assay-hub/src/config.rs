//! Hub Configuration - worker pool sizing and sandbox limits

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the sandbox worker pool
///
/// # Example
///
/// ```
/// use assay_hub::HubConfig;
///
/// let config = HubConfig::default();
/// assert_eq!(config.pool_size(), assay_hub::max_cores());
/// assert_eq!(config.timeout().as_millis(), 1000);
///
/// let config = HubConfig::with_pool_size(0);
/// assert_eq!(config.pool_size(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Number of sandbox runtimes; clamped to at least 1
    pub size: usize,

    /// Wall-clock budget for one script run, in milliseconds
    pub timeout_ms: u64,

    /// Memory budget per runtime, in megabytes
    pub memory_limit_mb: usize,

    /// Replace a runtime that faulted instead of keeping it unusable
    pub respawn_on_fault: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            size: max_cores(),
            timeout_ms: 1000,
            memory_limit_mb: 64,
            respawn_on_fault: true,
        }
    }
}

impl HubConfig {
    /// Default configuration with a specific pool size
    pub fn with_pool_size(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    /// Set the per-run timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set whether faulted runtimes are replaced
    pub fn with_respawn_on_fault(mut self, respawn: bool) -> Self {
        self.respawn_on_fault = respawn;
        self
    }

    /// Effective pool size
    pub fn pool_size(&self) -> usize {
        self.size.max(1)
    }

    /// Per-run timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

/// Number of logical CPU cores on this machine
pub fn max_cores() -> usize {
    num_cpus::get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HubConfig::default();
        assert!(config.pool_size() >= 1);
        assert_eq!(config.timeout(), Duration::from_millis(1000));
        assert_eq!(config.memory_limit_mb, 64);
        assert!(config.respawn_on_fault);
    }

    #[test]
    fn test_builders() {
        let config = HubConfig::with_pool_size(3)
            .with_timeout_ms(250)
            .with_respawn_on_fault(false);
        assert_eq!(config.pool_size(), 3);
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert!(!config.respawn_on_fault);
    }
}
