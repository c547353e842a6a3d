//! Scheduler Settings
//!
//! Configuration for the frame scheduler. All types implement [`Default`]
//! and serde, so a configuration can be embedded in an application's own
//! settings file.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use myth_scheduler::settings::SchedulerSettings;
//!
//! let settings = SchedulerSettings {
//!     clustered_lighting: true,
//!     ..Default::default()
//! };
//! settings.validate()?;
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SchedulerError};
use crate::trace::TraceChannels;

/// Maximum number of lights a single cluster cell can reference.
pub const MAX_LIGHTS_PER_CELL: u32 = 255;

/// Top-level scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Assign light clusters to render actions.
    pub clustered_lighting: bool,
    /// Cell grid used by light clusters.
    pub clusters: ClusterSettings,
    /// GPU profiler configuration.
    pub profiler: ProfilerSettings,
    /// Trace channels enabled at startup.
    pub trace: TraceChannels,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            clustered_lighting: true,
            clusters: ClusterSettings::default(),
            profiler: ProfilerSettings::default(),
            trace: TraceChannels::empty(),
        }
    }
}

impl SchedulerSettings {
    /// Checks every value against its valid range.
    pub fn validate(&self) -> Result<()> {
        self.clusters.validate()?;
        self.profiler.validate()
    }
}

/// Light cluster cell grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    /// Number of cells along X, Y and Z.
    pub cells: [u32; 3],
    /// Number of lights each cell can reference.
    pub max_lights_per_cell: u32,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            cells: [10, 3, 10],
            max_lights_per_cell: 12,
        }
    }
}

impl ClusterSettings {
    pub fn validate(&self) -> Result<()> {
        if self.cells.contains(&0) {
            return Err(SchedulerError::InvalidSettings(format!(
                "cluster cells must be non-zero, got {:?}",
                self.cells
            )));
        }
        if self.max_lights_per_cell == 0 || self.max_lights_per_cell > MAX_LIGHTS_PER_CELL {
            return Err(SchedulerError::InvalidSettings(format!(
                "max_lights_per_cell must be in 1..={MAX_LIGHTS_PER_CELL}, got {}",
                self.max_lights_per_cell
            )));
        }
        Ok(())
    }
}

/// GPU profiler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerSettings {
    /// Request the profiler to be enabled at startup.
    pub enabled: bool,
    /// Number of frames whose queries may be in flight at once.
    ///
    /// GPU readback lags the CPU by 1-2 frames, so at least 3 is recommended.
    pub frames_in_flight: u32,
    /// Maximum number of timing slots per frame.
    pub max_slots: u32,
}

impl Default for ProfilerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            frames_in_flight: 4,
            max_slots: 64,
        }
    }
}

impl ProfilerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 {
            return Err(SchedulerError::InvalidSettings(
                "profiler frames_in_flight must be at least 1".to_string(),
            ));
        }
        if self.max_slots == 0 {
            return Err(SchedulerError::InvalidSettings(
                "profiler max_slots must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
