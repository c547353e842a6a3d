use glam::Vec4;

use super::RenderTargetKey;
use super::layer::{LAYERID_UI, LayerId};
use super::render_target::ClearFlags;

/// Normalized viewport rectangle: `(x, y, width, height)` in 0..1.
pub type Rect = Vec4;

/// Full-target viewport.
pub const FULL_RECT: Rect = Vec4::new(0.0, 0.0, 1.0, 1.0);

/// The scheduler's view of a camera.
///
/// View/projection state belongs to the culling system; here a camera is its
/// ordering (priority), the layers it renders, where it renders to and how
/// it clears.
#[derive(Debug, Clone)]
pub struct Camera {
    name: String,
    priority: i32,
    layers: Vec<LayerId>,

    render_target: Option<RenderTargetKey>,
    clear: ClearFlags,
    clear_color: Vec4,
    clear_depth: f32,
    clear_stencil: u32,

    // === Post effects ===
    post_effects_enabled: bool,
    // Layers at or after this one are rendered without post effects.
    disable_post_effects_layer: Option<LayerId>,

    rect: Rect,
    scissor_rect: Rect,

    // Non-empty: the camera supplies its own passes and is skipped by the compiler.
    render_passes: Vec<String>,

    dirty: bool,
}

impl Camera {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            layers: Vec::new(),
            render_target: None,
            clear: ClearFlags::all(),
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            clear_depth: 1.0,
            clear_stencil: 0,
            post_effects_enabled: false,
            disable_post_effects_layer: Some(LAYERID_UI),
            rect: FULL_RECT,
            scissor_rect: FULL_RECT,
            render_passes: Vec::new(),
            dirty: true,
        }
    }

    // === Builders ===

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_layers(mut self, layers: &[LayerId]) -> Self {
        self.layers = layers.to_vec();
        self
    }

    #[must_use]
    pub fn with_render_target(mut self, target: RenderTargetKey) -> Self {
        self.render_target = Some(target);
        self
    }

    #[must_use]
    pub fn with_clear(mut self, clear: ClearFlags) -> Self {
        self.clear = clear;
        self
    }

    #[must_use]
    pub fn with_post_effects(mut self, enabled: bool) -> Self {
        self.post_effects_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_disable_post_effects_layer(mut self, layer: Option<LayerId>) -> Self {
        self.disable_post_effects_layer = layer;
        self
    }

    #[must_use]
    pub fn with_rect(mut self, rect: Rect) -> Self {
        self.rect = rect;
        self
    }

    #[must_use]
    pub fn with_scissor_rect(mut self, rect: Rect) -> Self {
        self.scissor_rect = rect;
        self
    }

    #[must_use]
    pub fn with_render_passes<S: Into<String>>(mut self, passes: impl IntoIterator<Item = S>) -> Self {
        self.render_passes = passes.into_iter().map(Into::into).collect();
        self
    }

    // === Accessors ===

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: i32) {
        if self.priority != priority {
            self.priority = priority;
            self.dirty = true;
        }
    }

    #[inline]
    #[must_use]
    pub fn layers(&self) -> &[LayerId] {
        &self.layers
    }

    /// Replaces the layer set. Call
    /// [`RenderWorld::link_camera`](crate::scene::RenderWorld::link_camera)
    /// afterwards to update the layers' camera lists.
    pub fn set_layers(&mut self, layers: &[LayerId]) {
        if self.layers != layers {
            self.layers = layers.to_vec();
            self.dirty = true;
        }
    }

    #[inline]
    #[must_use]
    pub fn render_target(&self) -> Option<RenderTargetKey> {
        self.render_target
    }

    pub fn set_render_target(&mut self, target: Option<RenderTargetKey>) {
        if self.render_target != target {
            self.render_target = target;
            self.dirty = true;
        }
    }

    #[inline]
    #[must_use]
    pub fn clear_flags(&self) -> ClearFlags {
        self.clear
    }

    pub fn set_clear_flags(&mut self, clear: ClearFlags) {
        if self.clear != clear {
            self.clear = clear;
            self.dirty = true;
        }
    }

    #[inline]
    #[must_use]
    pub fn clear_color(&self) -> Vec4 {
        self.clear_color
    }

    /// Clear values are read at execution time and never trigger a recompile.
    pub fn set_clear_color(&mut self, color: Vec4) {
        self.clear_color = color;
    }

    #[inline]
    #[must_use]
    pub fn clear_depth(&self) -> f32 {
        self.clear_depth
    }

    pub fn set_clear_depth(&mut self, depth: f32) {
        self.clear_depth = depth;
    }

    #[inline]
    #[must_use]
    pub fn clear_stencil(&self) -> u32 {
        self.clear_stencil
    }

    pub fn set_clear_stencil(&mut self, stencil: u32) {
        self.clear_stencil = stencil;
    }

    #[inline]
    #[must_use]
    pub fn post_effects_enabled(&self) -> bool {
        self.post_effects_enabled
    }

    pub fn set_post_effects_enabled(&mut self, enabled: bool) {
        if self.post_effects_enabled != enabled {
            self.post_effects_enabled = enabled;
            self.dirty = true;
        }
    }

    #[inline]
    #[must_use]
    pub fn disable_post_effects_layer(&self) -> Option<LayerId> {
        self.disable_post_effects_layer
    }

    pub fn set_disable_post_effects_layer(&mut self, layer: Option<LayerId>) {
        if self.disable_post_effects_layer != layer {
            self.disable_post_effects_layer = layer;
            self.dirty = true;
        }
    }

    #[inline]
    #[must_use]
    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn set_rect(&mut self, rect: Rect) {
        if self.rect != rect {
            self.rect = rect;
            self.dirty = true;
        }
    }

    #[inline]
    #[must_use]
    pub fn scissor_rect(&self) -> Rect {
        self.scissor_rect
    }

    pub fn set_scissor_rect(&mut self, rect: Rect) {
        if self.scissor_rect != rect {
            self.scissor_rect = rect;
            self.dirty = true;
        }
    }

    #[inline]
    #[must_use]
    pub fn render_passes(&self) -> &[String] {
        &self.render_passes
    }

    /// `true` when the camera brings its own render passes.
    #[inline]
    #[must_use]
    pub fn uses_camera_passes(&self) -> bool {
        !self.render_passes.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}
