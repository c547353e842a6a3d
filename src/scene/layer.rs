//! Layer
//!
//! A layer is an ordered, named, id-stable group of drawable instances. The
//! culling system fills its opaque and transparent instance lists; the
//! scheduler only reads their lengths, the clear/target settings and the
//! camera and light sets.
//!
//! Every setter records what changed in [`LayerDirty`]. The compiler collects
//! and clears these flags, so mutating a layer is enough to trigger a
//! recompile of the frame's render actions.

use bitflags::bitflags;
use rustc_hash::FxHashSet;

use super::render_target::ClearFlags;
use super::{CameraKey, LightKey, Lights, RenderTargetKey};

/// Stable, user-facing layer identifier.
pub type LayerId = u32;

pub const LAYERID_WORLD: LayerId = 0;
/// Depth grab layer. Shared by every camera that renders it, so it always
/// keeps its own render target.
pub const LAYERID_DEPTH: LayerId = 1;
pub const LAYERID_SKYBOX: LayerId = 2;
pub const LAYERID_IMMEDIATE: LayerId = 3;
/// Default post-effect stop layer of cameras.
pub const LAYERID_UI: LayerId = 4;

/// Opaque handle to a drawable produced by the scene graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u32);

bitflags! {
    /// What changed on a layer since the last compile.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct LayerDirty: u8 {
        const INSTANCES = 1 << 0;
        const LIGHTS    = 1 << 1;
        const CAMERAS   = 1 << 2;
        /// Enabled state, clear flags, render target or sampled targets.
        const STATE     = 1 << 3;
    }
}

#[derive(Debug, Clone)]
pub struct Layer {
    id: LayerId,
    name: String,
    enabled: bool,

    opaque_instances: Vec<InstanceId>,
    transparent_instances: Vec<InstanceId>,

    lights: Vec<LightKey>,
    // Omni and spot lights; directional lights are never clustered.
    clustered_lights: FxHashSet<LightKey>,

    cameras: Vec<CameraKey>,

    render_target: Option<RenderTargetKey>,
    clear: ClearFlags,
    sampled_targets: Vec<RenderTargetKey>,

    dirty: LayerDirty,
}

impl Layer {
    #[must_use]
    pub fn new(id: LayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            enabled: true,
            opaque_instances: Vec::new(),
            transparent_instances: Vec::new(),
            lights: Vec::new(),
            clustered_lights: FxHashSet::default(),
            cameras: Vec::new(),
            render_target: None,
            clear: ClearFlags::empty(),
            sampled_targets: Vec::new(),
            dirty: LayerDirty::empty(),
        }
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
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> LayerId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.dirty |= LayerDirty::STATE | LayerDirty::CAMERAS;
        }
    }

    // ── Instances ──────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn opaque_instances(&self) -> &[InstanceId] {
        &self.opaque_instances
    }

    #[inline]
    #[must_use]
    pub fn transparent_instances(&self) -> &[InstanceId] {
        &self.transparent_instances
    }

    /// Instances of one sub-collection.
    #[inline]
    #[must_use]
    pub fn instances(&self, transparent: bool) -> &[InstanceId] {
        if transparent {
            &self.transparent_instances
        } else {
            &self.opaque_instances
        }
    }

    pub fn add_instance(&mut self, instance: InstanceId, transparent: bool) {
        let list = if transparent {
            &mut self.transparent_instances
        } else {
            &mut self.opaque_instances
        };
        if !list.contains(&instance) {
            list.push(instance);
            self.dirty |= LayerDirty::INSTANCES;
        }
    }

    pub fn remove_instance(&mut self, instance: InstanceId) {
        let before = self.opaque_instances.len() + self.transparent_instances.len();
        self.opaque_instances.retain(|i| *i != instance);
        self.transparent_instances.retain(|i| *i != instance);
        if before != self.opaque_instances.len() + self.transparent_instances.len() {
            self.dirty |= LayerDirty::INSTANCES;
        }
    }

    pub fn clear_instances(&mut self) {
        if !self.opaque_instances.is_empty() || !self.transparent_instances.is_empty() {
            self.opaque_instances.clear();
            self.transparent_instances.clear();
            self.dirty |= LayerDirty::INSTANCES;
        }
    }

    // ── Lights ─────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn lights(&self) -> &[LightKey] {
        &self.lights
    }

    #[inline]
    #[must_use]
    pub fn clustered_lights(&self) -> &FxHashSet<LightKey> {
        &self.clustered_lights
    }

    #[inline]
    #[must_use]
    pub fn has_clustered_lights(&self) -> bool {
        !self.clustered_lights.is_empty()
    }

    /// Adds a light. `lights` is used to classify it as clustered or not.
    pub fn add_light(&mut self, light: LightKey, lights: &Lights) {
        if self.lights.contains(&light) {
            return;
        }
        self.lights.push(light);
        if lights.get(light).is_some_and(|l| l.kind().is_clustered()) {
            self.clustered_lights.insert(light);
        }
        self.dirty |= LayerDirty::LIGHTS;
    }

    pub fn remove_light(&mut self, light: LightKey) {
        if let Some(pos) = self.lights.iter().position(|l| *l == light) {
            self.lights.remove(pos);
            self.clustered_lights.remove(&light);
            self.dirty |= LayerDirty::LIGHTS;
        }
    }

    pub fn clear_lights(&mut self) {
        if !self.lights.is_empty() {
            self.lights.clear();
            self.clustered_lights.clear();
            self.dirty |= LayerDirty::LIGHTS;
        }
    }

    // ── Cameras ────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn cameras(&self) -> &[CameraKey] {
        &self.cameras
    }

    pub fn add_camera(&mut self, camera: CameraKey) {
        if !self.cameras.contains(&camera) {
            self.cameras.push(camera);
            self.dirty |= LayerDirty::CAMERAS;
        }
    }

    pub fn remove_camera(&mut self, camera: CameraKey) {
        if let Some(pos) = self.cameras.iter().position(|c| *c == camera) {
            self.cameras.remove(pos);
            self.dirty |= LayerDirty::CAMERAS;
        }
    }

    // ── Output ─────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn render_target(&self) -> Option<RenderTargetKey> {
        self.render_target
    }

    pub fn set_render_target(&mut self, target: Option<RenderTargetKey>) {
        if self.render_target != target {
            self.render_target = target;
            self.dirty |= LayerDirty::STATE;
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
            self.dirty |= LayerDirty::STATE;
        }
    }

    /// Render targets sampled by this layer's materials.
    #[inline]
    #[must_use]
    pub fn sampled_targets(&self) -> &[RenderTargetKey] {
        &self.sampled_targets
    }

    pub fn add_sampled_target(&mut self, target: RenderTargetKey) {
        if !self.sampled_targets.contains(&target) {
            self.sampled_targets.push(target);
            self.dirty |= LayerDirty::STATE;
        }
    }

    // ── Dirty tracking ─────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn dirty(&self) -> LayerDirty {
        self.dirty
    }

    /// Returns and clears the dirty flags.
    pub fn take_dirty(&mut self) -> LayerDirty {
        std::mem::take(&mut self.dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Light, RenderWorld};

    #[test]
    fn test_setters_mark_dirty() {
        let mut layer = Layer::new(7, "Seven");
        assert!(layer.dirty().is_empty());

        layer.set_enabled(false);
        assert!(layer.dirty().contains(LayerDirty::STATE));

        layer.take_dirty();
        layer.set_enabled(false);
        assert!(layer.dirty().is_empty(), "unchanged value must not dirty");

        layer.add_instance(InstanceId(1), true);
        assert!(layer.dirty().contains(LayerDirty::INSTANCES));
        assert_eq!(layer.instances(true), &[InstanceId(1)]);
        assert!(layer.instances(false).is_empty());
    }

    #[test]
    fn test_clustered_light_classification() {
        let mut world = RenderWorld::new();
        let sun = world.add_light(Light::directional("Sun"));
        let lamp = world.add_light(Light::omni("Lamp", 5.0));
        let layer = world.add_layer(Layer::new(LAYERID_WORLD, "World"));

        world.add_light_to_layer(layer, sun);
        assert!(!world.layers[layer].has_clustered_lights());

        world.add_light_to_layer(layer, lamp);
        assert!(world.layers[layer].has_clustered_lights());
        assert!(world.layers[layer].clustered_lights().contains(&lamp));

        world.remove_light(lamp);
        assert!(!world.layers[layer].has_clustered_lights());
        assert_eq!(world.layers[layer].lights(), &[sun]);
    }
}
