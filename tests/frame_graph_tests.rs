//! Frame Graph Tests
//!
//! Tests for:
//! - Load edges setting the previous writer's store ops
//! - Backbuffer finalization
//! - Cubemap face chains and mipmap deferral
//! - Sampled-target liveness
//! - Pass merging
//! - Materializing render actions into passes

use myth_scheduler::renderer::composition::{LayerComposition, RenderGraphCompiler};
use myth_scheduler::renderer::graph::{
    ColorAttachmentOps, DepthStencilOps, FrameGraph, FramePassBuilder, PassExecutor, PassKind,
    PassTarget, RenderPass,
};
use myth_scheduler::renderer::profiler::TimingSlot;
use myth_scheduler::scene::{
    Camera, LAYERID_UI, LAYERID_WORLD, Layer, Light, RenderTarget, RenderTargetKey, RenderWorld,
    TextureId, TextureInfo,
};
use myth_scheduler::settings::SchedulerSettings;

fn targets(count: usize) -> Vec<RenderTargetKey> {
    let mut world = RenderWorld::new();
    (0..count)
        .map(|i| world.add_render_target(RenderTarget::new(format!("RT{i}"), 64, 64)))
        .collect()
}

fn pass(name: &str, target: PassTarget) -> RenderPass {
    let mut pass = RenderPass::new(name, PassKind::PostProcess, target);
    pass.color_ops = Some(ColorAttachmentOps::default());
    pass.depth_stencil_ops = Some(DepthStencilOps::default());
    pass
}

fn cube_face_pass(name: &str, target: RenderTargetKey, face: u8) -> RenderPass {
    let mut pass = pass(name, PassTarget::Offscreen(target));
    pass.color_texture = Some(TextureInfo::cubemap_face(TextureId(9), face).with_mipmaps(true));
    if let Some(color) = &mut pass.color_ops {
        color.clear = true;
        color.mipmaps = true;
        color.store = true;
    }
    pass
}

#[derive(Default)]
struct RecordingExecutor {
    executed: Vec<String>,
}

impl PassExecutor for RecordingExecutor {
    fn execute(&mut self, pass: &RenderPass, _timing: Option<&TimingSlot>) {
        self.executed.push(pass.name.clone());
    }
}

// ============================================================================
// Load edges
// ============================================================================

#[test]
fn later_load_forces_earlier_store() {
    let rt = targets(1)[0];
    let mut a = pass("A", PassTarget::Offscreen(rt));
    if let Some(color) = &mut a.color_ops {
        color.clear = true;
    }
    let mut b = pass("B", PassTarget::Offscreen(rt));
    if let Some(ds) = &mut b.depth_stencil_ops {
        ds.clear_depth = true;
        ds.clear_stencil = true;
    }

    let mut graph = FrameGraph::new();
    graph.add_pass(a);
    graph.add_pass(b);
    graph.compile();

    let a = &graph.passes()[0];
    let a_color = a.color_ops.unwrap();
    let a_ds = a.depth_stencil_ops.unwrap();
    // B loads colour, clears depth and stencil.
    assert!(a_color.store);
    assert!(!a_ds.store_depth);
    assert!(!a_ds.store_stencil);
}

#[test]
fn depth_load_forces_depth_store() {
    let rt = targets(1)[0];
    let a = pass("A", PassTarget::Offscreen(rt));
    let mut b = pass("B", PassTarget::Offscreen(rt));
    if let Some(color) = &mut b.color_ops {
        color.clear = true;
    }

    let mut graph = FrameGraph::new();
    graph.add_pass(a);
    graph.add_pass(b);
    graph.compile();

    let a = &graph.passes()[0];
    assert!(!a.color_ops.unwrap().store);
    assert!(a.depth_stencil_ops.unwrap().store_depth);
}

#[test]
fn different_targets_are_independent() {
    let rts = targets(2);
    let mut graph = FrameGraph::new();
    graph.add_pass(pass("A", PassTarget::Offscreen(rts[0])));
    graph.add_pass(pass("B", PassTarget::Offscreen(rts[1])));
    graph.compile();

    assert!(!graph.passes()[0].color_ops.unwrap().store);
    assert!(!graph.passes()[0].depth_stencil_ops.unwrap().store_depth);
}

// ============================================================================
// Backbuffer
// ============================================================================

#[test]
fn last_backbuffer_pass_stores_without_resolve() {
    let mut graph = FrameGraph::new();
    for name in ["First", "Last"] {
        let mut p = pass(name, PassTarget::Backbuffer);
        p.samples = 4;
        if let Some(color) = &mut p.color_ops {
            color.resolve = true;
            color.mipmaps = true;
        }
        graph.add_pass(p);
    }
    graph.compile();

    let first = graph.passes()[0].color_ops.unwrap();
    let last = graph.passes()[1].color_ops.unwrap();
    assert!(first.store);
    assert!(first.resolve);
    assert!(last.store);
    assert!(!last.resolve);
    assert!(!last.mipmaps);
}

#[test]
fn backbuffer_passes_are_not_merged() {
    let mut graph = FrameGraph::new();
    graph.add_pass(pass("A", PassTarget::Backbuffer));
    graph.add_pass(pass("B", PassTarget::Backbuffer));
    graph.compile();
    assert!(!graph.passes()[0].skip_end);
    assert!(!graph.passes()[1].skip_start);
}

// ============================================================================
// Cubemaps
// ============================================================================

#[test]
fn cubemap_mipmaps_only_after_last_face() {
    let faces = targets(6);
    let mut graph = FrameGraph::new();
    for (face, target) in faces.iter().enumerate() {
        graph.add_pass(cube_face_pass(&format!("Face{face}"), *target, face as u8));
    }
    graph.compile();

    let mipmaps: Vec<bool> = graph
        .passes()
        .iter()
        .map(|p| p.color_ops.unwrap().mipmaps)
        .collect();
    assert_eq!(mipmaps, vec![false, false, false, false, false, true]);
}

#[test]
fn cubemap_consumer_breaks_the_chain() {
    let rts = targets(4);
    let mut graph = FrameGraph::new();
    graph.add_pass(cube_face_pass("Face0", rts[0], 0));
    graph.add_pass(cube_face_pass("Face1", rts[1], 1));
    let mut reader = pass("Reflections", PassTarget::Offscreen(rts[3]));
    reader.requires_cubemaps = true;
    graph.add_pass(reader);
    graph.add_pass(cube_face_pass("Face2", rts[2], 2));
    graph.compile();

    let passes = graph.passes();
    assert!(!passes[0].color_ops.unwrap().mipmaps);
    assert!(passes[1].color_ops.unwrap().mipmaps);
    assert!(passes[3].color_ops.unwrap().mipmaps);
}

// ============================================================================
// Sampled targets
// ============================================================================

#[test]
fn sampling_forces_writer_store() {
    let mut world = RenderWorld::new();
    let rts: Vec<_> = (0..2)
        .map(|i| world.add_render_target(RenderTarget::new(format!("RT{i}"), 64, 64)))
        .collect();
    let depth_only = world.add_render_target(RenderTarget::new("Shadow", 64, 64).with_depth(true, false));

    let mut color_writer = pass("ColorWriter", PassTarget::Offscreen(rts[0]));
    if let Some(color) = &mut color_writer.color_ops {
        color.clear = true;
    }
    let mut depth_writer = RenderPass::new("DepthWriter", PassKind::PostProcess, PassTarget::Offscreen(depth_only));
    depth_writer.depth_stencil_ops = Some(DepthStencilOps {
        clear_depth: true,
        ..Default::default()
    });
    let mut reader = pass("Reader", PassTarget::Offscreen(rts[1]));
    reader.sampled_targets.push(rts[0]);
    reader.sampled_targets.push(depth_only);

    let mut graph = FrameGraph::new();
    graph.add_pass(color_writer);
    graph.add_pass(depth_writer);
    graph.add_pass(reader);
    graph.compile();

    assert!(graph.passes()[0].color_ops.unwrap().store);
    assert!(graph.passes()[1].depth_stencil_ops.unwrap().store_depth);
}

// ============================================================================
// Merging and idempotence
// ============================================================================

#[test]
fn consecutive_loads_on_same_target_merge() {
    let rt = targets(1)[0];
    let mut graph = FrameGraph::new();
    let mut first = pass("First", PassTarget::Offscreen(rt));
    if let Some(color) = &mut first.color_ops {
        color.clear = true;
    }
    graph.add_pass(first);
    graph.add_pass(pass("Second", PassTarget::Offscreen(rt)));
    let mut hooked = pass("Hooked", PassTarget::Offscreen(rt));
    hooked.before_hook = true;
    graph.add_pass(hooked);
    graph.compile();

    let passes = graph.passes();
    assert!(passes[0].skip_end && passes[1].skip_start);
    assert!(!passes[1].skip_end && !passes[2].skip_start);
}

#[test]
fn compile_is_idempotent() {
    let rts = targets(2);
    let mut graph = FrameGraph::new();
    graph.add_pass(cube_face_pass("Face0", rts[0], 0));
    graph.add_pass(cube_face_pass("Face1", rts[1], 1));
    graph.add_pass(pass("A", PassTarget::Offscreen(rts[0])));
    graph.add_pass(pass("B", PassTarget::Backbuffer));
    graph.compile();
    let once = graph.passes().to_vec();
    graph.compile();
    assert_eq!(graph.passes(), once.as_slice());
}

// ============================================================================
// Materialization
// ============================================================================

#[test]
fn post_effect_camera_frame() {
    let mut world = RenderWorld::new();
    let rt = world.add_render_target(
        RenderTarget::new("Scene", 256, 256)
            .with_color(TextureInfo::new(TextureId(1)))
            .with_depth(true, false),
    );
    let world_layer = world.add_layer(Layer::new(LAYERID_WORLD, "World"));
    let ui = world.add_layer(Layer::new(LAYERID_UI, "UI"));
    let camera = world.add_camera(
        Camera::new("Main")
            .with_layers(&[LAYERID_WORLD, LAYERID_UI])
            .with_render_target(rt)
            .with_post_effects(true),
    );
    world.link_camera(camera);

    let mut comp = LayerComposition::new("frame");
    comp.push(&world.layers, world_layer);
    comp.push(&world.layers, ui);

    let mut compiler = RenderGraphCompiler::new(&SchedulerSettings::default()).unwrap();
    compiler.update(&mut comp, &mut world);

    let mut graph = FrameGraph::new();
    FramePassBuilder::default().build(&mut graph, compiler.render_actions(), &comp, &world);
    graph.compile();

    let passes = graph.passes();
    let kinds: Vec<_> = passes.iter().map(|p| p.kind).collect();
    assert_eq!(
        kinds,
        vec![
            PassKind::Forward { action: 0 },
            PassKind::Forward { action: 1 },
            PassKind::PostProcess,
            PassKind::Forward { action: 2 },
            PassKind::Forward { action: 3 },
        ]
    );
    assert_eq!(passes[2].target, PassTarget::Backbuffer);
    assert_eq!(passes[2].sampled_targets.as_slice(), &[rt]);

    // The scene target is loaded by the transparent pass and sampled by post.
    assert!(passes[0].color_ops.unwrap().store);
    assert!(passes[0].depth_stencil_ops.unwrap().store_depth);
    assert!(passes[1].color_ops.unwrap().store);
    assert!(passes[0].skip_end && passes[1].skip_start);

    // UI draws on top of the post-processed image.
    assert!(passes[2].color_ops.unwrap().store);
    let last = passes[4].color_ops.unwrap();
    assert!(last.store && !last.resolve);

    let mut executor = RecordingExecutor::default();
    graph.render(&mut executor);
    assert_eq!(executor.executed.len(), 5);
    assert_eq!(executor.executed[0], "Main/World/opaque");
    assert_eq!(executor.executed[2], "Main/postprocess");
}

#[test]
fn shadow_passes_precede_camera_passes() {
    let mut world = RenderWorld::new();
    let sun_map = world.add_render_target(RenderTarget::new("SunMap", 1024, 1024).with_depth(true, false));
    let lamp_faces: Vec<_> = (0..6)
        .map(|i| world.add_render_target(RenderTarget::new(format!("Lamp{i}"), 256, 256).with_depth(true, false)))
        .collect();
    let sun = world.add_light(Light::directional("Sun").with_shadows(&[sun_map]));
    let lamp = world.add_light(Light::omni("Lamp", 4.0).with_shadows(&lamp_faces));
    let layer = world.add_layer(Layer::new(LAYERID_WORLD, "World"));
    world.add_light_to_layer(layer, sun);
    world.add_light_to_layer(layer, lamp);
    let camera = world.add_camera(Camera::new("Main").with_layers(&[LAYERID_WORLD]));
    world.link_camera(camera);

    let mut comp = LayerComposition::new("shadows");
    comp.push(&world.layers, layer);

    let mut compiler = RenderGraphCompiler::new(&SchedulerSettings::default()).unwrap();
    compiler.update(&mut comp, &mut world);

    let mut graph = FrameGraph::new();
    FramePassBuilder::new(4).build(&mut graph, compiler.render_actions(), &comp, &world);
    graph.compile();

    let passes = graph.passes();
    // 6 omni faces, 1 directional map, 2 forward passes.
    assert_eq!(passes.len(), 9);
    assert!(passes[..7].iter().all(|p| matches!(p.kind, PassKind::Shadow { .. })));
    assert!(matches!(passes[6].kind, PassKind::Shadow { light, .. } if light == sun));
    assert!(passes[..7].iter().all(|p| p.depth_stencil_ops.unwrap().clear_depth));
    assert_eq!(passes[7].samples, 4);

    let last = passes[8].color_ops.unwrap();
    assert!(last.store && !last.resolve);
}
