//! Render Graph Compiler
//!
//! Turns a [`LayerComposition`] and the cameras registered on its layers into
//! the ordered list of [`RenderAction`]s for the frame.
//!
//! # Algorithm
//!
//! 1. Gather cameras from every enabled layer in composition order,
//!    deduplicated, then stable-sort them by ascending priority.
//! 2. For each camera:
//!    - A camera with its own render passes gets one placeholder action.
//!    - Otherwise walk the *global* sublayer list and emit an action for every
//!      enabled sublayer the camera renders, so all cameras agree on the
//!      relative order of shared layers.
//!    - The camera's target overrides the layer's, except for the depth layer.
//!    - Camera clears apply on the camera's first action, or the first time a
//!      `(camera, target)` pair appears. Layer clears always apply.
//!    - The action before the camera's post-effect stop layer triggers post
//!      processing; without a stop layer the last action does. Actions after
//!      the stop layer of a post-effect camera render to the framebuffer.
//!    - A post-effect camera with a target pulls preceding actions of the
//!      camera stack into its target (see [`RenderGraphCompiler::propagate_render_target`]).
//! 3. Assign light clusters when clustered lighting is enabled.
//!
//! Compilation only runs when the composition, a member layer, a camera or a
//! light reports a change. Compiling an unchanged input twice produces equal
//! action lists.

use std::fmt::Write as _;

use bitflags::bitflags;
use log::trace;

use super::layer_composition::LayerComposition;
use super::light_clusters::LightClusterAssigner;
use super::render_action::RenderAction;
use crate::errors::Result;
use crate::scene::{
    Camera, CameraKey, LAYERID_DEPTH, Layer, LayerDirty, LayerKey, RenderWorld,
};
use crate::settings::SchedulerSettings;
use crate::trace::{self as trace_channels, TraceChannels};

bitflags! {
    /// What [`RenderGraphCompiler::update`] found changed.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct UpdateFlags: u8 {
        const INSTANCES = 1 << 0;
        const LIGHTS    = 1 << 1;
        /// Render actions were recompiled.
        const CAMERAS   = 1 << 2;
    }
}

pub struct RenderGraphCompiler {
    clustered_lighting: bool,

    cameras: Vec<CameraKey>,
    // Storage is reused across compiles; only `..action_count` is live.
    render_actions: Vec<RenderAction>,
    action_count: usize,
    clusters: LightClusterAssigner,

    // Scratch: layers rendered by the camera being compiled.
    camera_layers: Vec<LayerKey>,
}

impl RenderGraphCompiler {
    pub fn new(settings: &SchedulerSettings) -> Result<Self> {
        settings.validate()?;
        if !settings.trace.is_empty() {
            trace_channels::set(settings.trace, true);
        }
        Ok(Self {
            clustered_lighting: settings.clustered_lighting,
            cameras: Vec::new(),
            render_actions: Vec::new(),
            action_count: 0,
            clusters: LightClusterAssigner::new(settings.clusters),
            camera_layers: Vec::new(),
        })
    }

    /// Compiled actions in render order.
    #[inline]
    #[must_use]
    pub fn render_actions(&self) -> &[RenderAction] {
        &self.render_actions[..self.action_count]
    }

    /// Cameras in render order.
    #[inline]
    #[must_use]
    pub fn cameras(&self) -> &[CameraKey] {
        &self.cameras
    }

    #[inline]
    #[must_use]
    pub fn clusters(&self) -> &LightClusterAssigner {
        &self.clusters
    }

    /// Collects change flags from the composition and the world and
    /// recompiles what changed. Returns an empty set when nothing was done.
    pub fn update(&mut self, composition: &mut LayerComposition, world: &mut RenderWorld) -> UpdateFlags {
        let mut layer_dirty = LayerDirty::empty();
        for key in composition.layer_list() {
            if let Some(layer) = world.layers.get_mut(*key) {
                layer_dirty |= layer.take_dirty();
            }
        }
        let mut cameras_dirty = false;
        for camera in world.cameras.values_mut() {
            cameras_dirty |= camera.take_dirty();
        }
        let mut lights_dirty = false;
        for light in world.lights.values_mut() {
            lights_dirty |= light.take_dirty();
        }

        let structural = composition.is_dirty();
        composition.clear_dirty();

        let mut result = UpdateFlags::empty();
        if structural || layer_dirty.contains(LayerDirty::INSTANCES) {
            result |= UpdateFlags::INSTANCES;
        }
        if structural || lights_dirty || layer_dirty.contains(LayerDirty::LIGHTS) {
            result |= UpdateFlags::LIGHTS;
        }
        if structural
            || cameras_dirty
            || layer_dirty.intersects(LayerDirty::CAMERAS | LayerDirty::STATE)
            || result.contains(UpdateFlags::LIGHTS)
        {
            result |= UpdateFlags::CAMERAS;
        }

        if result.contains(UpdateFlags::CAMERAS) {
            self.compile_actions(composition, world);
        }
        if !result.is_empty() {
            if self.clustered_lighting {
                self.clusters
                    .assign(&mut self.render_actions[..self.action_count], &world.layers);
            }
            self.log_render_actions(composition, world);
        }
        result
    }

    /// Unconditionally recompiles render actions and clusters.
    pub fn compile(&mut self, composition: &LayerComposition, world: &RenderWorld) {
        self.compile_actions(composition, world);
        if self.clustered_lighting {
            self.clusters
                .assign(&mut self.render_actions[..self.action_count], &world.layers);
        }
        self.log_render_actions(composition, world);
    }

    /// Refreshes the cell grids of the assigned light clusters.
    pub fn update_clusters(&mut self, world: &RenderWorld) {
        if self.clustered_lighting {
            self.clusters.update_clusters(&world.layers, &world.lights);
        }
    }

    /// Drops every action and releases all light clusters.
    pub fn destroy(&mut self) {
        self.render_actions.clear();
        self.action_count = 0;
        self.cameras.clear();
        self.clusters.destroy();
    }

    // ========================================================================
    // Compilation
    // ========================================================================

    fn gather_cameras(&mut self, composition: &LayerComposition, world: &RenderWorld) {
        self.cameras.clear();
        for (key, _, _) in composition.sublayers() {
            let Some(layer) = world.layers.get(key) else {
                continue;
            };
            if !layer.enabled() {
                continue;
            }
            for camera in layer.cameras() {
                if world.cameras.contains_key(*camera) && !self.cameras.contains(camera) {
                    self.cameras.push(*camera);
                }
            }
        }
        // Stable: equal priorities keep discovery order.
        self.cameras
            .sort_by_key(|key| world.cameras.get(*key).map_or(0, Camera::priority));
    }

    fn compile_actions(&mut self, composition: &LayerComposition, world: &RenderWorld) {
        self.gather_cameras(composition, world);
        self.action_count = 0;

        for camera_index in 0..self.cameras.len() {
            let camera_key = self.cameras[camera_index];
            let Some(camera) = world.cameras.get(camera_key) else {
                continue;
            };

            if camera.uses_camera_passes() {
                let action = self.next_action();
                action.camera = camera_key;
                action.render_target = camera.render_target();
                action.use_camera_passes = true;
                action.first_camera_use = true;
                action.last_camera_use = true;
                continue;
            }

            let first_index = self.action_count;
            let mut last_index: Option<usize> = None;
            let mut post_process_marked = false;
            self.camera_layers.clear();

            for (slot, (layer_key, transparent, sublayer_enabled)) in composition.sublayers().enumerate() {
                let Some(layer) = world.layers.get(layer_key) else {
                    continue;
                };
                if !(layer.enabled() && sublayer_enabled) || layer.cameras().is_empty() {
                    continue;
                }
                if !camera.layers().contains(&layer.id()) {
                    continue;
                }
                if !self.camera_layers.contains(&layer_key) {
                    self.camera_layers.push(layer_key);
                }

                if !post_process_marked && camera.disable_post_effects_layer() == Some(layer.id()) {
                    post_process_marked = true;
                    // The previous action is the last post-processed one.
                    if let Some(previous) = last_index {
                        self.render_actions[previous].trigger_postprocess = true;
                    }
                }

                if layer.cameras().contains(&camera_key) {
                    let index = self.action_count;
                    self.add_render_action(ActionSource {
                        layer_key,
                        layer,
                        slot,
                        transparent,
                        camera_key,
                        camera,
                        first: index == first_index,
                        post_process_marked,
                    });
                    last_index = Some(index);
                }
            }

            if let Some(last) = last_index {
                let (camera_layers, actions) = (&self.camera_layers, &mut self.render_actions);
                actions[first_index].collect_directional_lights(camera_layers, &world.layers, &world.lights);
                actions[last].last_camera_use = true;
                if !post_process_marked {
                    actions[last].trigger_postprocess = true;
                }
            }

            if camera.render_target().is_some() && camera.post_effects_enabled() {
                self.propagate_render_target(first_index, camera, world);
            }
        }

        self.render_actions.truncate(self.action_count);
    }

    /// Reuses or allocates the next action slot, reset.
    fn next_action(&mut self) -> &mut RenderAction {
        let index = self.action_count;
        self.action_count += 1;
        if index == self.render_actions.len() {
            self.render_actions.push(RenderAction::default());
        }
        let action = &mut self.render_actions[index];
        action.reset();
        action
    }

    fn add_render_action(&mut self, src: ActionSource<'_>) {
        let index = self.action_count;

        // The depth layer is shared by all cameras and keeps its own target.
        let mut render_target = src.layer.render_target();
        if src.camera.render_target().is_some() && src.layer.id() != LAYERID_DEPTH {
            render_target = src.camera.render_target();
        }

        let used = self.render_actions[..index]
            .iter()
            .rev()
            .any(|ra| ra.camera == src.camera_key && ra.render_target == render_target);
        let needs_camera_clear = src.first || !used;

        // Layers after the post-effect stop layer are drawn on top of the
        // post-processed image.
        if src.post_process_marked && src.camera.post_effects_enabled() {
            render_target = None;
        }

        let action = self.next_action();
        action.layer = Some(src.layer_key);
        action.layer_index = Some(src.slot);
        action.camera = src.camera_key;
        action.transparent = src.transparent;
        action.render_target = render_target;
        action.first_camera_use = src.first;
        action.setup_clears(needs_camera_clear.then_some(src.camera), src.layer);
    }

    /// Walks backwards from the action before `start` and renders the
    /// preceding camera stack into `from`'s target.
    ///
    /// Stops at an action that already has a target (the depth layer is
    /// skipped), at a camera with a different viewport or scissor rect, or at
    /// a camera-pass placeholder.
    fn propagate_render_target(&mut self, start: usize, from: &Camera, world: &RenderWorld) {
        for index in (0..start).rev() {
            let action = &self.render_actions[index];
            if action.use_camera_passes {
                break;
            }
            let is_depth = action
                .layer
                .and_then(|key| world.layers.get(key))
                .is_some_and(|layer| layer.id() == LAYERID_DEPTH);

            if action.render_target.is_some() && !is_depth {
                break;
            }
            if is_depth {
                continue;
            }
            if let Some(camera) = world.cameras.get(action.camera)
                && (camera.rect() != from.rect() || camera.scissor_rect() != from.scissor_rect())
            {
                break;
            }

            self.render_actions[index].render_target = from.render_target();
        }
    }

    // ========================================================================
    // Tracing
    // ========================================================================

    fn log_render_actions(&self, composition: &LayerComposition, world: &RenderWorld) {
        if !trace_channels::is_enabled(TraceChannels::RENDER_ACTION) {
            return;
        }
        trace!(
            target: trace_channels::TARGET_RENDER_ACTION,
            "Render Actions for composition: {}",
            composition.name()
        );
        for (index, action) in self.render_actions().iter().enumerate() {
            trace!(
                target: trace_channels::TARGET_RENDER_ACTION,
                "{}",
                self.describe_action(index, action, composition, world)
            );
        }
    }

    fn describe_action(
        &self,
        index: usize,
        action: &RenderAction,
        composition: &LayerComposition,
        world: &RenderWorld,
    ) -> String {
        let camera = world.cameras.get(action.camera).map_or("-", Camera::name);
        let layer = action.layer.and_then(|key| world.layers.get(key));
        let enabled = match (layer, action.layer_index) {
            (Some(layer), Some(slot)) => {
                layer.enabled() && composition.sub_layer_enabled().get(slot).copied().unwrap_or(false)
            }
            _ => true,
        };
        let instances = layer.map_or(0, |l| l.instances(action.transparent).len());

        let mut line = String::new();
        let _ = write!(
            line,
            "{index:<3} Cam: {camera:<16} Lay: {:<16} {} {} Meshes: {instances:>4} RT: {:<24} Clear: {}{}{}",
            layer.map_or("-", Layer::name),
            if action.transparent { "TRANSP" } else { "OPAQUE" },
            if enabled { "ENABLED " } else { "DISABLED" },
            world.render_target_name(action.render_target),
            if action.clear_color { "Color " } else { "..... " },
            if action.clear_depth { "Depth " } else { "..... " },
            if action.clear_stencil { "Stencil" } else { "......." },
        );
        if let Some(layer) = layer {
            let _ = write!(
                line,
                " Lights: ({}/{})",
                layer.clustered_lights().len(),
                layer.lights().len()
            );
        }
        let cluster_name = action
            .light_clusters
            .filter(|key| Some(*key) != self.clusters.empty_cluster())
            .and_then(|key| self.clusters.get(key))
            .map_or("", |c| c.name());
        let _ = write!(line, " {cluster_name:<10}");
        if action.use_camera_passes {
            line.push_str(" CAMERA-PASSES");
        }
        if action.first_camera_use {
            line.push_str(" CAM-FIRST");
        }
        if action.last_camera_use {
            line.push_str(" CAM-LAST");
        }
        if action.trigger_postprocess {
            line.push_str(" POSTPROCESS");
        }
        if !action.directional_lights.is_empty() {
            let _ = write!(line, " DirLights: {}", action.directional_lights.len());
        }
        line
    }
}

struct ActionSource<'a> {
    layer_key: LayerKey,
    layer: &'a Layer,
    slot: usize,
    transparent: bool,
    camera_key: CameraKey,
    camera: &'a Camera,
    first: bool,
    post_process_marked: bool,
}
