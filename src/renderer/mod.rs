//! Renderer Scheduling
//!
//! Per-frame flow:
//!
//! ```text
//! LayerComposition ──dirty──► RenderGraphCompiler ──► [RenderAction]
//!                                                          │
//!                               FramePassBuilder ◄─────────┘
//!                                      │
//!                                      ▼
//!                  FrameGraph::compile (liveness) ──► FrameGraph::render
//!                                                          │
//!                                     GpuProfiler slots ◄──┘
//! ```
//!
//! - [`composition`]: layer ordering, render actions, light clusters
//! - [`graph`]: render passes and their attachment-op liveness
//! - [`profiler`]: asynchronous GPU timings

pub mod composition;
pub mod graph;
pub mod profiler;
