//! Render Pass Description
//!
//! A [`RenderPass`] is the frame graph's unit of work: one target, the
//! attachment operations to apply on it and what the pass samples. The
//! attachment ops start from per-target defaults set by the builder and are
//! then rewritten by [`FrameGraph::compile`](super::FrameGraph::compile).
//!
//! | Op | Default | Changed by compile |
//! |----|---------|--------------------|
//! | colour store | offscreen: `true`, backbuffer: `false` | a later pass loads it, or backbuffer's last pass |
//! | depth/stencil store | depth-only target: `true`, else `false` | a later pass loads it, or it is sampled |
//! | resolve | `samples > 1` | backbuffer's last pass: `false` |
//! | mipmaps | texture has mips | earlier face of a cubemap chain: `false` |

use glam::Vec4;
use smallvec::SmallVec;

use crate::scene::{CameraKey, LightKey, RenderTargetKey, TextureInfo};

/// Where a pass renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassTarget {
    /// The default framebuffer.
    Backbuffer,
    Offscreen(RenderTargetKey),
}

impl PassTarget {
    #[must_use]
    pub fn from_render_target(target: Option<RenderTargetKey>) -> Self {
        target.map_or(Self::Backbuffer, Self::Offscreen)
    }

    #[inline]
    #[must_use]
    pub fn render_target(&self) -> Option<RenderTargetKey> {
        match self {
            Self::Backbuffer => None,
            Self::Offscreen(key) => Some(*key),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PassKind {
    /// Shadow map view `face` of a light.
    Shadow { light: LightKey, face: u8 },
    /// Draws the render action at `action`.
    Forward { action: usize },
    /// Post-effect chain of a camera.
    PostProcess,
    /// Position reserved for a camera's own passes.
    CameraPasses,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachmentOps {
    pub clear: bool,
    pub clear_value: Vec4,
    pub store: bool,
    /// Resolve the multisampled buffer.
    pub resolve: bool,
    /// Regenerate the mip chain after the pass.
    pub mipmaps: bool,
}

impl Default for ColorAttachmentOps {
    fn default() -> Self {
        Self {
            clear: false,
            clear_value: Vec4::new(0.0, 0.0, 0.0, 1.0),
            store: false,
            resolve: false,
            mipmaps: false,
        }
    }
}

impl ColorAttachmentOps {
    #[must_use]
    pub fn to_wgpu(&self) -> wgpu::Operations<wgpu::Color> {
        let load = if self.clear {
            let c = self.clear_value.as_dvec4();
            wgpu::LoadOp::Clear(wgpu::Color {
                r: c.x,
                g: c.y,
                b: c.z,
                a: c.w,
            })
        } else {
            wgpu::LoadOp::Load
        };
        wgpu::Operations {
            load,
            store: store_op(self.store),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilOps {
    pub clear_depth: bool,
    pub clear_depth_value: f32,
    pub store_depth: bool,
    pub clear_stencil: bool,
    pub clear_stencil_value: u32,
    pub store_stencil: bool,
}

impl Default for DepthStencilOps {
    fn default() -> Self {
        Self {
            clear_depth: false,
            clear_depth_value: 1.0,
            store_depth: false,
            clear_stencil: false,
            clear_stencil_value: 0,
            store_stencil: false,
        }
    }
}

impl DepthStencilOps {
    #[must_use]
    pub fn depth_to_wgpu(&self) -> wgpu::Operations<f32> {
        wgpu::Operations {
            load: if self.clear_depth {
                wgpu::LoadOp::Clear(self.clear_depth_value)
            } else {
                wgpu::LoadOp::Load
            },
            store: store_op(self.store_depth),
        }
    }

    #[must_use]
    pub fn stencil_to_wgpu(&self) -> wgpu::Operations<u32> {
        wgpu::Operations {
            load: if self.clear_stencil {
                wgpu::LoadOp::Clear(self.clear_stencil_value)
            } else {
                wgpu::LoadOp::Load
            },
            store: store_op(self.store_stencil),
        }
    }
}

#[inline]
fn store_op(store: bool) -> wgpu::StoreOp {
    if store {
        wgpu::StoreOp::Store
    } else {
        wgpu::StoreOp::Discard
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPass {
    pub name: String,
    pub kind: PassKind,
    pub target: PassTarget,
    pub camera: Option<CameraKey>,

    /// `None` when the target has no colour buffer.
    pub color_ops: Option<ColorAttachmentOps>,
    /// `None` when the target has neither depth nor stencil.
    pub depth_stencil_ops: Option<DepthStencilOps>,
    pub samples: u32,
    pub color_texture: Option<TextureInfo>,

    /// Render targets read by the pass.
    pub sampled_targets: SmallVec<[RenderTargetKey; 2]>,
    /// The pass samples a cubemap, so every pending cubemap face must be
    /// complete (mipmaps included) before it runs.
    pub requires_cubemaps: bool,

    /// The executor runs a callback before / after the pass body.
    pub before_hook: bool,
    pub after_hook: bool,

    /// Continue the previous pass instead of starting a new one.
    pub skip_start: bool,
    /// Leave the pass open for the next one.
    pub skip_end: bool,
}

impl RenderPass {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: PassKind, target: PassTarget) -> Self {
        Self {
            name: name.into(),
            kind,
            target,
            camera: None,
            color_ops: None,
            depth_stencil_ops: None,
            samples: 1,
            color_texture: None,
            sampled_targets: SmallVec::new(),
            requires_cubemaps: false,
            before_hook: false,
            after_hook: false,
            skip_start: false,
            skip_end: false,
        }
    }

    /// `true` when the pass clears any buffer.
    #[must_use]
    pub fn has_clears(&self) -> bool {
        self.color_ops.is_some_and(|ops| ops.clear)
            || self
                .depth_stencil_ops
                .is_some_and(|ops| ops.clear_depth || ops.clear_stencil)
    }

    /// Short description for trace output.
    #[must_use]
    pub fn describe_ops(&self) -> String {
        let mut out = String::new();
        if let Some(color) = self.color_ops {
            out.push_str(&format!(
                "color[{}{}{}{}]",
                if color.clear { "clear " } else { "load " },
                if color.store { "store" } else { "discard" },
                if color.resolve { " resolve" } else { "" },
                if color.mipmaps { " mips" } else { "" },
            ));
        }
        if let Some(ds) = self.depth_stencil_ops {
            out.push_str(&format!(
                " depth[{} {}] stencil[{} {}]",
                if ds.clear_depth { "clear" } else { "load" },
                if ds.store_depth { "store" } else { "discard" },
                if ds.clear_stencil { "clear" } else { "load" },
                if ds.store_stencil { "store" } else { "discard" },
            ));
        }
        if self.skip_start {
            out.push_str(" skip-start");
        }
        if self.skip_end {
            out.push_str(" skip-end");
        }
        out
    }
}
