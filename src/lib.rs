#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! # Myth Scheduler
//!
//! Frame-level render scheduling: which cameras draw which layers into which
//! targets, in what order, with which clears, and what each pass has to keep
//! for the passes after it.

pub mod errors;
pub mod renderer;
pub mod scene;
pub mod settings;
pub mod trace;

pub use errors::{Result, SchedulerError};
pub use renderer::composition::{
    CompositionEvent, LayerComposition, LightClusterAssigner, RenderAction, RenderGraphCompiler,
    UpdateFlags,
};
pub use renderer::graph::{FrameGraph, FramePassBuilder, PassExecutor, PassTarget, RenderPass};
pub use renderer::profiler::{
    EncoderTimer, FrameReport, GpuProfiler, QuerySetTimer, SlotTiming, TimestampBackend,
    TimingSlot,
};
pub use scene::{Camera, Layer, Light, RenderTarget, RenderWorld};
pub use settings::{ClusterSettings, ProfilerSettings, SchedulerSettings};
pub use trace::TraceChannels;
