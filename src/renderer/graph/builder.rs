//! Frame Pass Builder
//!
//! Materializes compiled [`RenderAction`]s into [`RenderPass`]es:
//!
//! 1. Shadow passes of local (omni/spot) shadow casters, once per frame.
//! 2. Per camera, its directional shadow passes before its first pass.
//! 3. One forward pass per render action.
//! 4. A post-process pass after the triggering action of a post-effect
//!    camera that renders to its own target.
//! 5. A placeholder pass for cameras that bring their own passes.
//!
//! Attachment ops start from per-target defaults (see [`super::pass`]);
//! [`FrameGraph::compile`](super::FrameGraph::compile) finalizes them.

use rustc_hash::FxHashSet;

use super::frame_graph::FrameGraph;
use super::pass::{ColorAttachmentOps, DepthStencilOps, PassKind, PassTarget, RenderPass};
use crate::renderer::composition::{LayerComposition, RenderAction};
use crate::scene::{Camera, LightKey, RenderWorld};

pub struct FramePassBuilder {
    backbuffer_samples: u32,
    // Scratch: lights whose shadow passes were emitted this frame.
    shadowed: FxHashSet<LightKey>,
}

impl Default for FramePassBuilder {
    fn default() -> Self {
        Self::new(1)
    }
}

impl FramePassBuilder {
    #[must_use]
    pub fn new(backbuffer_samples: u32) -> Self {
        Self {
            backbuffer_samples: backbuffer_samples.max(1),
            shadowed: FxHashSet::default(),
        }
    }

    /// Resets `graph` and fills it with the passes for `actions`.
    pub fn build(
        &mut self,
        graph: &mut FrameGraph,
        actions: &[RenderAction],
        composition: &LayerComposition,
        world: &RenderWorld,
    ) {
        graph.reset();
        self.shadowed.clear();

        self.add_local_shadow_passes(graph, composition, world);

        for (index, action) in actions.iter().enumerate() {
            let Some(camera) = world.cameras.get(action.camera) else {
                continue;
            };

            if action.use_camera_passes {
                let target = PassTarget::from_render_target(action.render_target);
                let mut pass = RenderPass::new(
                    format!("{}/camera-passes", camera.name()),
                    PassKind::CameraPasses,
                    target,
                );
                pass.camera = Some(action.camera);
                pass.before_hook = true;
                pass.after_hook = true;
                self.apply_target_defaults(&mut pass, world);
                graph.add_pass(pass);
                continue;
            }

            if action.first_camera_use {
                for light in &action.directional_lights {
                    self.add_shadow_passes(graph, *light, Some(camera), world);
                }
            }

            graph.add_pass(self.forward_pass(index, action, camera, world));

            if action.trigger_postprocess
                && camera.post_effects_enabled()
                && let Some(source) = camera.render_target()
            {
                let mut pass = RenderPass::new(
                    format!("{}/postprocess", camera.name()),
                    PassKind::PostProcess,
                    PassTarget::Backbuffer,
                );
                pass.camera = Some(action.camera);
                pass.sampled_targets.push(source);
                pass.before_hook = true;
                self.apply_target_defaults(&mut pass, world);
                graph.add_pass(pass);
            }
        }
    }

    fn add_local_shadow_passes(
        &mut self,
        graph: &mut FrameGraph,
        composition: &LayerComposition,
        world: &RenderWorld,
    ) {
        for (key, _, sublayer_enabled) in composition.sublayers() {
            let Some(layer) = world.layers.get(key) else {
                continue;
            };
            if !layer.enabled() || !sublayer_enabled {
                continue;
            }
            for light in layer.lights() {
                let is_local = world
                    .lights
                    .get(*light)
                    .is_some_and(|l| l.kind().is_clustered());
                if is_local {
                    self.add_shadow_passes(graph, *light, None, world);
                }
            }
        }
    }

    fn add_shadow_passes(
        &mut self,
        graph: &mut FrameGraph,
        light_key: LightKey,
        camera: Option<&Camera>,
        world: &RenderWorld,
    ) {
        let Some(light) = world.lights.get(light_key) else {
            return;
        };
        // Directional shadows are per camera; local ones once per frame.
        if !light.renders_shadows() || (camera.is_none() && !self.shadowed.insert(light_key)) {
            return;
        }
        for (face, target) in light.shadow_targets().iter().enumerate() {
            let name = match camera {
                Some(camera) => format!("{}/shadow:{}", camera.name(), light.name()),
                None => format!("shadow:{}/{face}", light.name()),
            };
            let mut pass = RenderPass::new(
                name,
                PassKind::Shadow {
                    light: light_key,
                    face: face as u8,
                },
                PassTarget::Offscreen(*target),
            );
            self.apply_target_defaults(&mut pass, world);
            if let Some(ds) = &mut pass.depth_stencil_ops {
                ds.clear_depth = true;
            }
            if let Some(color) = &mut pass.color_ops {
                color.clear = true;
            }
            graph.add_pass(pass);
        }
    }

    fn forward_pass(
        &self,
        index: usize,
        action: &RenderAction,
        camera: &Camera,
        world: &RenderWorld,
    ) -> RenderPass {
        let layer = action.layer.and_then(|key| world.layers.get(key));
        let name = format!(
            "{}/{}/{}",
            camera.name(),
            layer.map_or("-", |l| l.name()),
            if action.transparent { "transparent" } else { "opaque" }
        );
        let mut pass = RenderPass::new(
            name,
            PassKind::Forward { action: index },
            PassTarget::from_render_target(action.render_target),
        );
        pass.camera = Some(action.camera);
        self.apply_target_defaults(&mut pass, world);

        if let Some(color) = &mut pass.color_ops {
            color.clear = action.clear_color;
            color.clear_value = camera.clear_color();
        }
        if let Some(ds) = &mut pass.depth_stencil_ops {
            ds.clear_depth = action.clear_depth;
            ds.clear_depth_value = camera.clear_depth();
            ds.clear_stencil = action.clear_stencil;
            ds.clear_stencil_value = camera.clear_stencil();
        }

        if let Some(layer) = layer {
            pass.sampled_targets.extend(layer.sampled_targets().iter().copied());
            pass.requires_cubemaps = layer.sampled_targets().iter().any(|key| {
                world
                    .render_targets
                    .get(*key)
                    .and_then(|rt| rt.color)
                    .is_some_and(|tex| tex.is_cubemap())
            });
        }
        pass
    }

    fn apply_target_defaults(&self, pass: &mut RenderPass, world: &RenderWorld) {
        match pass.target {
            PassTarget::Backbuffer => {
                pass.samples = self.backbuffer_samples;
                pass.color_ops = Some(ColorAttachmentOps {
                    resolve: self.backbuffer_samples > 1,
                    ..Default::default()
                });
                pass.depth_stencil_ops = Some(DepthStencilOps::default());
            }
            PassTarget::Offscreen(key) => {
                let Some(rt) = world.render_targets.get(key) else {
                    return;
                };
                pass.samples = rt.samples;
                pass.color_texture = rt.color;
                pass.color_ops = rt.color.map(|tex| ColorAttachmentOps {
                    store: true,
                    resolve: rt.samples > 1,
                    mipmaps: tex.mipmaps,
                    ..Default::default()
                });
                pass.depth_stencil_ops = (rt.depth || rt.stencil).then(|| DepthStencilOps {
                    store_depth: rt.is_depth_only(),
                    ..Default::default()
                });
            }
        }
    }
}
