pub mod key_index;
pub mod node;
pub mod peer;
pub mod routing;
pub mod types;
pub mod workers;

use serde::Serialize;
use std::time::Duration;

// Maintenance defaults
pub const MAINTENANCE_PERIOD: Duration = Duration::from_secs(10);
pub const MAX_RETRIES: u32 = 3;

/// Tuning shared by the four maintenance tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MaintenanceConfig {
    /// Interval between two ticks of the same task.
    pub period: Duration,
    /// Consecutive failures tolerated before a task takes its fallback.
    pub max_retries: u32,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            period: MAINTENANCE_PERIOD,
            max_retries: MAX_RETRIES,
        }
    }
}

pub use node::ChordNode;
pub use types::{Identifier, Node, Ring};
