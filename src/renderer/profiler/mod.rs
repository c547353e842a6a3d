//! GPU Profiling
//!
//! - [`GpuProfiler`]: the enable/disable state machine, per-frame named slots
//!   and the pending-frame queue
//! - [`TimestampBackend`]: GPU side of the profiler
//! - [`QuerySetTimer`]: render-pass `timestamp_writes`, one query set per frame
//! - [`EncoderTimer`]: `write_timestamp` on the command encoder, pooled query pairs
//!
//! Both backends read results back through [`readback::TimestampReadback`],
//! which never waits on the GPU.

pub mod encoder_timer;
pub mod gpu_profiler;
pub mod query_set_timer;
pub mod readback;

pub use encoder_timer::EncoderTimer;
pub use gpu_profiler::{
    FrameReport, GpuProfiler, QueryStatus, SlotQueries, SlotTiming, TimestampBackend,
    TimestampMode, TimingSlot,
};
pub use query_set_timer::QuerySetTimer;
pub use readback::{ReadbackStatus, TimestampReadback};
