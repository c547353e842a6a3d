//! Render Graph Benchmarks
//!
//! - `compile_actions`: full RenderAction compile of a multi-camera composition
//! - `frame_graph_compile`: pass materialization plus liveness compile

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use myth_scheduler::renderer::composition::{LayerComposition, RenderGraphCompiler};
use myth_scheduler::renderer::graph::{FrameGraph, FramePassBuilder};
use myth_scheduler::scene::{
    Camera, InstanceId, LAYERID_UI, Layer, Light, RenderTarget, RenderWorld, TextureId, TextureInfo,
};
use myth_scheduler::settings::SchedulerSettings;

const LAYERS: u32 = 16;
const CAMERAS: i32 = 4;

fn build_scene() -> (RenderWorld, LayerComposition) {
    let mut world = RenderWorld::new();
    let mut comp = LayerComposition::new("bench");

    let lamp = world.add_light(Light::omni("Lamp", 8.0));
    for id in 0..LAYERS {
        let layer = world.add_layer(Layer::new(100 + id, format!("Layer{id}")));
        world.layers[layer].add_instance(InstanceId(id), false);
        world.layers[layer].add_instance(InstanceId(id + 1000), true);
        if id % 2 == 0 {
            world.add_light_to_layer(layer, lamp);
        }
        comp.push(&world.layers, layer);
    }
    let ui = world.add_layer(Layer::new(LAYERID_UI, "UI"));
    comp.push(&world.layers, ui);

    let layer_ids: Vec<u32> = (0..LAYERS).map(|id| 100 + id).chain([LAYERID_UI]).collect();
    for index in 0..CAMERAS {
        let mut camera = Camera::new(format!("Camera{index}"))
            .with_priority(index)
            .with_layers(&layer_ids);
        if index == CAMERAS - 1 {
            let rt = world.add_render_target(
                RenderTarget::new("Stack", 1920, 1080)
                    .with_color(TextureInfo::new(TextureId(1)))
                    .with_depth(true, true),
            );
            camera = camera.with_render_target(rt).with_post_effects(true);
        }
        let key = world.add_camera(camera);
        world.link_camera(key);
    }
    (world, comp)
}

fn bench_compile_actions(c: &mut Criterion) {
    let (world, comp) = build_scene();
    let mut compiler = RenderGraphCompiler::new(&SchedulerSettings::default()).unwrap();

    c.bench_function("compile_actions", |b| {
        b.iter(|| {
            compiler.compile(black_box(&comp), black_box(&world));
            black_box(compiler.render_actions().len())
        });
    });
}

fn bench_frame_graph(c: &mut Criterion) {
    let (world, comp) = build_scene();
    let mut compiler = RenderGraphCompiler::new(&SchedulerSettings::default()).unwrap();
    compiler.compile(&comp, &world);
    let mut builder = FramePassBuilder::new(4);
    let mut graph = FrameGraph::new();

    c.bench_function("frame_graph_compile", |b| {
        b.iter(|| {
            builder.build(&mut graph, black_box(compiler.render_actions()), &comp, &world);
            graph.compile();
            black_box(graph.pass_count())
        });
    });
}

criterion_group!(benches, bench_compile_actions, bench_frame_graph);
criterion_main!(benches);
