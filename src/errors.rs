//! Error Types
//!
//! This module defines the error types used throughout the scheduler.
//!
//! # Overview
//!
//! The main error type [`SchedulerError`] only covers configuration and
//! construction failures:
//! - Invalid scheduler / profiler settings
//! - GPU features missing for timestamp queries
//! - Profiler capacity beyond what a backend can allocate
//!
//! Frame-loop operations (composition mutation, compile, frame graph
//! execution, profiler polling) never return errors. Invariant violations
//! are logged and ignored, and lost GPU timings are reported as "no data".
//!
//! # Usage
//!
//! ```rust,ignore
//! use myth_scheduler::errors::Result;
//!
//! fn configure() -> Result<()> {
//!     settings.validate()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the scheduler.
#[derive(Error, Debug)]
pub enum SchedulerError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A settings value is out of its valid range.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    // ========================================================================
    // GPU Timing Errors
    // ========================================================================
    /// The device was created without the features required for timestamp queries.
    #[error("Timestamp queries unsupported: missing feature {0}")]
    TimestampQueryUnsupported(&'static str),

    /// The profiler backend cannot hold the requested number of slots per frame.
    #[error("Profiler capacity exceeded: {requested} slots requested (max {max})")]
    ProfilerCapacity {
        /// Number of slots requested
        requested: u32,
        /// Maximum supported by the backend
        max: u32,
    },
}

/// Alias for `Result<T, SchedulerError>`.
pub type Result<T> = std::result::Result<T, SchedulerError>;
