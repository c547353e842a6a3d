//! Render Action
//!
//! One compiled rendering step: a camera rendering one sublayer into one
//! render target. The compiler reuses the action storage between compiles,
//! so every field is rewritten through [`RenderAction::reset`].

use smallvec::SmallVec;

use super::light_clusters::ClusterKey;
use crate::scene::{
    Camera, CameraKey, ClearFlags, LayerKey, Layer, LightKey, LightKind, Lights, Layers,
    RenderTargetKey,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderAction {
    /// `None` for camera-pass placeholders.
    pub layer: Option<LayerKey>,
    /// Slot index of the sublayer in the composition.
    pub layer_index: Option<usize>,
    pub camera: CameraKey,
    pub transparent: bool,

    /// `None` renders to the default framebuffer.
    pub render_target: Option<RenderTargetKey>,

    pub clear_color: bool,
    pub clear_depth: bool,
    pub clear_stencil: bool,

    // === Camera stack bookkeeping ===
    pub first_camera_use: bool,
    pub last_camera_use: bool,
    pub trigger_postprocess: bool,
    /// Placeholder for a camera that supplies its own render passes.
    pub use_camera_passes: bool,

    /// Non-owning; the cluster belongs to the compiler's cluster assigner.
    pub light_clusters: Option<ClusterKey>,

    /// Shadow-casting directional lights of every layer the camera renders.
    /// Only filled on the camera's first action.
    pub directional_lights: SmallVec<[LightKey; 4]>,
}

impl RenderAction {
    pub fn reset(&mut self) {
        self.layer = None;
        self.layer_index = None;
        self.camera = CameraKey::default();
        self.transparent = false;
        self.render_target = None;
        self.clear_color = false;
        self.clear_depth = false;
        self.clear_stencil = false;
        self.first_camera_use = false;
        self.last_camera_use = false;
        self.trigger_postprocess = false;
        self.use_camera_passes = false;
        self.light_clusters = None;
        self.directional_lights.clear();
    }

    /// Per buffer: cleared if the camera requests it (only when `camera` is
    /// given) or the layer requests it.
    pub fn setup_clears(&mut self, camera: Option<&Camera>, layer: &Layer) {
        let camera_clear = camera.map_or(ClearFlags::empty(), Camera::clear_flags);
        let clear = camera_clear | layer.clear_flags();
        self.clear_color = clear.contains(ClearFlags::COLOR);
        self.clear_depth = clear.contains(ClearFlags::DEPTH);
        self.clear_stencil = clear.contains(ClearFlags::STENCIL);
    }

    #[must_use]
    pub fn clear_flags(&self) -> ClearFlags {
        let mut flags = ClearFlags::empty();
        flags.set(ClearFlags::COLOR, self.clear_color);
        flags.set(ClearFlags::DEPTH, self.clear_depth);
        flags.set(ClearFlags::STENCIL, self.clear_stencil);
        flags
    }

    #[inline]
    #[must_use]
    pub fn has_clears(&self) -> bool {
        self.clear_color || self.clear_depth || self.clear_stencil
    }

    /// Collects enabled, shadow-casting directional lights of `camera_layers`,
    /// deduplicated, in discovery order.
    pub fn collect_directional_lights(
        &mut self,
        camera_layers: &[LayerKey],
        layers: &Layers,
        lights: &Lights,
    ) {
        self.directional_lights.clear();
        for layer in camera_layers.iter().filter_map(|key| layers.get(*key)) {
            for key in layer.lights() {
                let Some(light) = lights.get(*key) else {
                    continue;
                };
                if light.kind() == LightKind::Directional
                    && light.enabled()
                    && light.cast_shadows()
                    && !self.directional_lights.contains(key)
                {
                    self.directional_lights.push(*key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{LAYERID_WORLD, Light, RenderWorld};

    #[test]
    fn test_setup_clears_ors_camera_and_layer() {
        let camera = Camera::new("Main").with_clear(ClearFlags::COLOR);
        let layer = Layer::new(LAYERID_WORLD, "World").with_clear(ClearFlags::DEPTH);

        let mut ra = RenderAction::default();
        ra.setup_clears(Some(&camera), &layer);
        assert_eq!(ra.clear_flags(), ClearFlags::COLOR | ClearFlags::DEPTH);

        ra.setup_clears(None, &layer);
        assert_eq!(ra.clear_flags(), ClearFlags::DEPTH);
        assert!(ra.has_clears());
    }

    #[test]
    fn test_reset_clears_every_field() {
        let mut ra = RenderAction {
            transparent: true,
            clear_color: true,
            first_camera_use: true,
            trigger_postprocess: true,
            use_camera_passes: true,
            layer_index: Some(3),
            ..Default::default()
        };
        ra.reset();
        assert_eq!(ra, RenderAction::default());
    }

    #[test]
    fn test_collect_directional_lights_dedups() {
        let mut world = RenderWorld::new();
        let sun = world.add_light(Light::directional("Sun").with_shadows(&[]));
        let moon = world.add_light(Light::directional("Moon"));
        let a = world.add_layer(Layer::new(0, "A"));
        let b = world.add_layer(Layer::new(1, "B"));
        for layer in [a, b] {
            world.add_light_to_layer(layer, sun);
            world.add_light_to_layer(layer, moon);
        }

        let mut ra = RenderAction::default();
        ra.collect_directional_lights(&[a, b], &world.layers, &world.lights);
        // Moon does not cast shadows.
        assert_eq!(ra.directional_lights.as_slice(), &[sun]);
    }
}
