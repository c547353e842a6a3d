//! Frame graph
//!
//! - [`RenderPass`]: target, attachment ops and sampled targets of one pass
//! - [`FramePassBuilder`]: render actions → ordered passes, shadow insertion
//! - [`FrameGraph`]: liveness compile (store/resolve/mipmaps, merging) and execution
//! - [`PassExecutor`]: the draw-submission side that runs each pass

pub mod builder;
pub mod frame_graph;
pub mod pass;

pub use builder::FramePassBuilder;
pub use frame_graph::{FrameGraph, PassExecutor};
pub use pass::{ColorAttachmentOps, DepthStencilOps, PassKind, PassTarget, RenderPass};
