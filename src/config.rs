// ── Runtime tuning configuration ──
//
// Channel sizing for the watcher's broadcast fan-out. The embedding
// application constructs a `WatcherConfig` and hands it in — this crate
// never reads config files.

use serde::{Deserialize, Serialize};

/// Tuning knobs for a [`DeviceWatcher`](crate::DeviceWatcher).
///
/// All capacities bound lossy broadcast channels: a subscriber that falls
/// further behind than the capacity sees a lag notice and skips ahead,
/// it never blocks the reconciliation loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Capacity of the change-set broadcast channel behind `updates()`.
    pub update_channel_capacity: usize,
    /// Capacity of the report broadcast channel behind `reports()`.
    pub report_channel_capacity: usize,
    /// Per-controller capacity of the control-change channel merged by
    /// `changes()`.
    pub control_channel_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            update_channel_capacity: 64,
            report_channel_capacity: 256,
            control_channel_capacity: 64,
        }
    }
}
