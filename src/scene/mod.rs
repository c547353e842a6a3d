//! Scene-side data consumed by the scheduler.
//!
//! These types are the scheduler's view of its collaborators: the scene graph
//! and culling system (layers, cameras, visible instance lists), the lighting
//! system (lights) and the resource layer (render targets). Identity is the
//! slotmap key; two entities with equal fields are still different entities.
//!
//! - [`Layer`]: ordered group of drawable instances, split opaque/transparent
//! - [`Camera`]: priority, layer set, target, clear and post-effect settings
//! - [`Light`]: type, shadow casting and enabled state
//! - [`RenderTarget`]: attachment description of an offscreen target
//! - [`RenderWorld`]: owning container for all of the above

pub mod camera;
pub mod layer;
pub mod light;
pub mod render_target;

pub use camera::{Camera, FULL_RECT, Rect};
pub use layer::{
    InstanceId, LAYERID_DEPTH, LAYERID_IMMEDIATE, LAYERID_SKYBOX, LAYERID_UI, LAYERID_WORLD,
    Layer, LayerDirty, LayerId,
};
pub use light::{Light, LightKind, SpotCone};
pub use render_target::{ClearFlags, RenderTarget, TextureId, TextureInfo};

use slotmap::{SlotMap, new_key_type};

new_key_type! {
    pub struct LayerKey;
    pub struct CameraKey;
    pub struct LightKey;
    pub struct RenderTargetKey;
}

pub type Layers = SlotMap<LayerKey, Layer>;
pub type Cameras = SlotMap<CameraKey, Camera>;
pub type Lights = SlotMap<LightKey, Light>;
pub type RenderTargets = SlotMap<RenderTargetKey, RenderTarget>;

/// Owning container for every entity the scheduler reads.
///
/// `RenderWorld` is pure data: it holds no ordering information. Render
/// order lives in [`LayerComposition`](crate::renderer::composition::LayerComposition).
#[derive(Default)]
pub struct RenderWorld {
    pub layers: Layers,
    pub cameras: Cameras,
    pub lights: Lights,
    pub render_targets: RenderTargets,
}

impl RenderWorld {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_layer(&mut self, layer: Layer) -> LayerKey {
        self.layers.insert(layer)
    }

    pub fn add_camera(&mut self, camera: Camera) -> CameraKey {
        self.cameras.insert(camera)
    }

    pub fn add_light(&mut self, light: Light) -> LightKey {
        self.lights.insert(light)
    }

    pub fn add_render_target(&mut self, target: RenderTarget) -> RenderTargetKey {
        self.render_targets.insert(target)
    }

    /// Registers `camera` on every layer whose id is in the camera's layer list,
    /// and unregisters it from every other layer.
    pub fn link_camera(&mut self, camera: CameraKey) {
        let Some(cam) = self.cameras.get(camera) else {
            log::warn!("link_camera: unknown camera {camera:?}");
            return;
        };
        for layer in self.layers.values_mut() {
            if cam.layers().contains(&layer.id()) {
                layer.add_camera(camera);
            } else {
                layer.remove_camera(camera);
            }
        }
    }

    /// Removes a camera from the world and from every layer that renders it.
    pub fn remove_camera(&mut self, camera: CameraKey) -> Option<Camera> {
        for layer in self.layers.values_mut() {
            layer.remove_camera(camera);
        }
        self.cameras.remove(camera)
    }

    /// Removes a light from the world and from every layer that references it.
    pub fn remove_light(&mut self, light: LightKey) -> Option<Light> {
        for layer in self.layers.values_mut() {
            layer.remove_light(light);
        }
        self.lights.remove(light)
    }

    /// Adds `light` to `layer`, keeping the layer's clustered light set in sync.
    pub fn add_light_to_layer(&mut self, layer: LayerKey, light: LightKey) {
        if let Some(l) = self.layers.get_mut(layer) {
            l.add_light(light, &self.lights);
        }
    }

    /// Display name of a render target, `"-"` for the default framebuffer.
    #[must_use]
    pub fn render_target_name(&self, target: Option<RenderTargetKey>) -> &str {
        target
            .and_then(|key| self.render_targets.get(key))
            .map_or("-", RenderTarget::name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_camera_follows_layer_ids() {
        let mut world = RenderWorld::new();
        let world_layer = world.add_layer(Layer::new(LAYERID_WORLD, "World"));
        let ui_layer = world.add_layer(Layer::new(LAYERID_UI, "UI"));

        let cam = world.add_camera(Camera::new("Main").with_layers(&[LAYERID_WORLD]));
        world.link_camera(cam);

        assert_eq!(world.layers[world_layer].cameras(), &[cam]);
        assert!(world.layers[ui_layer].cameras().is_empty());

        world.cameras[cam].set_layers(&[LAYERID_UI]);
        world.link_camera(cam);
        assert!(world.layers[world_layer].cameras().is_empty());
        assert_eq!(world.layers[ui_layer].cameras(), &[cam]);
    }

    #[test]
    fn test_remove_camera_unlinks() {
        let mut world = RenderWorld::new();
        let layer = world.add_layer(Layer::new(LAYERID_WORLD, "World"));
        let cam = world.add_camera(Camera::new("Main").with_layers(&[LAYERID_WORLD]));
        world.link_camera(cam);

        assert!(world.remove_camera(cam).is_some());
        assert!(world.layers[layer].cameras().is_empty());
    }
}
