//! Frame Graph
//!
//! Ordered render passes of one frame, plus the liveness pass that decides
//! their attachment operations.
//!
//! # Compile
//!
//! A single forward walk with a transient `target → last writer` map:
//!
//! - **Load edges**: when a pass does not clear colour (depth, stencil) of a
//!   target an earlier pass wrote, the earlier pass must store that buffer.
//! - **Sampled targets**: a pass sampling a target forces its last writer to
//!   store colour (depth for depth-only targets).
//! - **Cubemap chains**: consecutive writes to faces of one cubemap only
//!   regenerate mipmaps after the last face, unless a pass needing complete
//!   cubemaps runs in between.
//! - **Backbuffer**: its last pass stores colour, without resolve or mipmaps.
//! - **Merging**: consecutive passes on one offscreen target are merged when
//!   the second clears nothing and neither has a hook in between.
//!
//! Compile only ever sets stores and clears mipmap flags, so re-running it on
//! the same passes gives the same result.

use log::trace;
use rustc_hash::FxHashMap;

use super::pass::{PassTarget, RenderPass};
use crate::renderer::profiler::{GpuProfiler, TimestampBackend, TimingSlot};
use crate::scene::TextureId;
use crate::trace::{self as trace_channels, TraceChannels};

/// Executes compiled passes. Implemented by the draw-submission layer.
pub trait PassExecutor {
    /// `timing` is set when the pass runs under an enabled profiler.
    fn execute(&mut self, pass: &RenderPass, timing: Option<&TimingSlot>);
}

#[derive(Default)]
pub struct FrameGraph {
    passes: Vec<RenderPass>,
    // Transient, empty outside of `compile`.
    last_writer: FxHashMap<PassTarget, usize>,
}

impl FrameGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pass(&mut self, pass: RenderPass) {
        self.passes.push(pass);
    }

    #[inline]
    #[must_use]
    pub fn passes(&self) -> &[RenderPass] {
        &self.passes
    }

    #[inline]
    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Drops all passes, keeping allocations.
    pub fn reset(&mut self) {
        self.passes.clear();
    }

    /// Runs the liveness analysis over the passes.
    pub fn compile(&mut self) {
        let mut cube_chain: Option<(TextureId, usize)> = None;

        for index in 0..self.passes.len() {
            let (earlier, rest) = self.passes.split_at_mut(index);
            let pass = &rest[0];

            // Sampled targets must hold valid data.
            for sampled in &pass.sampled_targets {
                if let Some(writer) = self.last_writer.get(&PassTarget::Offscreen(*sampled)) {
                    let writer = &mut earlier[*writer];
                    match (&mut writer.color_ops, &mut writer.depth_stencil_ops) {
                        (Some(color), _) => color.store = true,
                        (None, Some(ds)) => ds.store_depth = true,
                        (None, None) => {}
                    }
                }
            }

            // Load edges to the previous writer of the same target.
            if let Some(previous) = self.last_writer.get(&pass.target) {
                let previous = &mut earlier[*previous];
                if let (Some(prev_color), Some(color)) = (&mut previous.color_ops, &pass.color_ops)
                    && !color.clear
                {
                    prev_color.store = true;
                }
                if let (Some(prev_ds), Some(ds)) =
                    (&mut previous.depth_stencil_ops, &pass.depth_stencil_ops)
                {
                    if !ds.clear_depth {
                        prev_ds.store_depth = true;
                    }
                    if !ds.clear_stencil {
                        prev_ds.store_stencil = true;
                    }
                }
            }
            self.last_writer.insert(pass.target, index);

            // Cubemap face chains.
            match pass.color_texture.filter(|tex| tex.is_cubemap()) {
                Some(texture) => {
                    if let Some((chain_texture, previous)) = cube_chain
                        && chain_texture == texture.texture
                        && let Some(color) = &mut earlier[previous].color_ops
                    {
                        color.mipmaps = false;
                    }
                    cube_chain = Some((texture.texture, index));
                }
                None if pass.requires_cubemaps => cube_chain = None,
                None => {}
            }
        }

        if let Some(last) = self.last_writer.get(&PassTarget::Backbuffer)
            && let Some(color) = &mut self.passes[*last].color_ops
        {
            color.store = true;
            color.resolve = false;
            color.mipmaps = false;
        }
        self.last_writer.clear();

        self.merge_passes();
        self.log_passes();
    }

    fn merge_passes(&mut self) {
        for index in 1..self.passes.len() {
            let (earlier, rest) = self.passes.split_at_mut(index);
            let previous = &mut earlier[index - 1];
            let pass = &mut rest[0];
            if matches!(pass.target, PassTarget::Offscreen(_))
                && pass.target == previous.target
                && !pass.has_clears()
                && !pass.before_hook
                && !previous.after_hook
            {
                previous.skip_end = true;
                pass.skip_start = true;
            }
        }
    }

    /// Executes the passes in order.
    pub fn render<E: PassExecutor>(&self, executor: &mut E) {
        for pass in &self.passes {
            executor.execute(pass, None);
        }
    }

    /// Executes the passes in order, each in a profiler slot named after it.
    pub fn render_profiled<E: PassExecutor, B: TimestampBackend>(
        &self,
        executor: &mut E,
        profiler: &mut GpuProfiler<B>,
    ) {
        for pass in &self.passes {
            let slot = profiler.get_slot(&pass.name);
            executor.execute(pass, slot.as_ref());
        }
    }

    fn log_passes(&self) {
        if !trace_channels::is_enabled(TraceChannels::FRAME_GRAPH) {
            return;
        }
        trace!(target: trace_channels::TARGET_FRAME_GRAPH, "Frame graph: {} passes", self.passes.len());
        for (index, pass) in self.passes.iter().enumerate() {
            trace!(
                target: trace_channels::TARGET_FRAME_GRAPH,
                "{index:<3} {:<32} {:?} {}",
                pass.name,
                pass.target,
                pass.describe_ops()
            );
        }
    }
}
