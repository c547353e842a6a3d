//! Layer Composition Tests
//!
//! Tests for:
//! - Parallel array invariant across every mutation
//! - Id / name lookups and opaque / transparent slot indices
//! - Duplicate add and absent remove being no-ops
//! - Draw-order comparison (`sort_*_layers`)
//! - Change notifications

use myth_scheduler::renderer::composition::{CompositionEvent, LayerComposition};
use myth_scheduler::scene::{Layer, LayerKey, RenderWorld};

fn world_with_layers(count: u32) -> (RenderWorld, Vec<LayerKey>) {
    let mut world = RenderWorld::new();
    let keys = (0..count)
        .map(|i| world.add_layer(Layer::new(100 + i, format!("Layer{i}"))))
        .collect();
    (world, keys)
}

fn assert_parallel(comp: &LayerComposition) {
    assert_eq!(comp.layer_list().len(), comp.sub_layer_list().len());
    assert_eq!(comp.layer_list().len(), comp.sub_layer_enabled().len());
}

// ============================================================================
// Structural invariants
// ============================================================================

#[test]
fn arrays_stay_parallel_through_mixed_mutations() {
    let (world, keys) = world_with_layers(4);
    let layers = &world.layers;
    let mut comp = LayerComposition::new("invariants");

    comp.push(layers, keys[0]);
    assert_parallel(&comp);
    comp.push_opaque(layers, keys[1]);
    assert_parallel(&comp);
    comp.insert_transparent(layers, keys[1], 0);
    assert_parallel(&comp);
    comp.insert(layers, keys[2], 1);
    assert_parallel(&comp);
    comp.push_transparent(layers, keys[3]);
    assert_parallel(&comp);
    comp.remove_opaque(layers, keys[1]);
    assert_parallel(&comp);
    comp.remove(layers, keys[0]);
    assert_parallel(&comp);
    comp.remove_transparent(layers, keys[3]);
    assert_parallel(&comp);

    assert_eq!(comp.len(), 3);
}

#[test]
fn lookups_follow_push_and_remove() {
    let (world, keys) = world_with_layers(2);
    let layers = &world.layers;
    let mut comp = LayerComposition::new("lookups");

    comp.push(layers, keys[0]);
    assert_eq!(comp.get_layer_by_id(100), Some(keys[0]));
    assert_eq!(comp.get_layer_by_name("Layer0"), Some(keys[0]));

    comp.remove(layers, keys[0]);
    assert_eq!(comp.get_layer_by_id(100), None);
    assert_eq!(comp.get_layer_by_name("Layer0"), None);
    assert!(comp.is_empty());
}

#[test]
fn opaque_index_shifts_on_insert() {
    let (world, keys) = world_with_layers(2);
    let layers = &world.layers;
    let mut comp = LayerComposition::new("indices");

    comp.push_opaque(layers, keys[0]);
    assert_eq!(comp.get_opaque_index(keys[0]), Some(0));

    comp.insert_opaque(layers, keys[1], 0);
    assert_eq!(comp.get_opaque_index(keys[1]), Some(0));
    assert_eq!(comp.get_opaque_index(keys[0]), Some(1));
    assert_eq!(comp.get_transparent_index(keys[0]), None);
}

#[test]
fn push_twice_is_idempotent() {
    let (world, keys) = world_with_layers(1);
    let layers = &world.layers;
    let mut comp = LayerComposition::new("idempotent");

    comp.push(layers, keys[0]);
    let list = comp.layer_list().to_vec();
    let sub = comp.sub_layer_list().to_vec();

    comp.push(layers, keys[0]);
    assert_eq!(comp.layer_list(), list.as_slice());
    assert_eq!(comp.sub_layer_list(), sub.as_slice());
    assert_eq!(comp.get_opaque_index(keys[0]), Some(0));
    assert_eq!(comp.get_transparent_index(keys[0]), Some(1));
}

#[test]
fn remove_absent_layer_is_noop() {
    let (world, keys) = world_with_layers(2);
    let layers = &world.layers;
    let mut comp = LayerComposition::new("absent");

    comp.push(layers, keys[0]);
    comp.remove(layers, keys[1]);
    comp.remove_transparent(layers, keys[1]);
    assert_eq!(comp.len(), 2);
    assert_eq!(comp.get_opaque_index(keys[1]), None);
}

#[test]
fn disabled_sublayer_keeps_its_slot() {
    let (world, keys) = world_with_layers(1);
    let mut comp = LayerComposition::new("enabled");
    comp.push(&world.layers, keys[0]);
    assert!(comp.is_dirty());

    comp.set_sublayer_enabled(1, false);
    assert_eq!(comp.sub_layer_enabled(), &[true, false]);
    // Out of range: ignored.
    comp.set_sublayer_enabled(7, false);
    assert_eq!(comp.len(), 2);
}

// ============================================================================
// Draw-order comparison
// ============================================================================

#[test]
fn sort_transparent_layers_by_topmost_slot() {
    let (world, keys) = world_with_layers(3);
    let layers = &world.layers;
    let back = 100;
    let front = 101;
    let mut comp = LayerComposition::new("sort");

    comp.push(layers, keys[0]);
    comp.push(layers, keys[1]);

    assert!(comp.sort_transparent_layers(&[front], &[back]) < 0);
    assert!(comp.sort_transparent_layers(&[back], &[front]) > 0);
    assert_eq!(comp.sort_transparent_layers(&[back], &[back]), 0);

    // A third layer in between changes every index after it.
    comp.insert(layers, keys[2], 2);
    comp.remove(layers, keys[2]);
    comp.push(layers, keys[2]);
    assert!(comp.sort_transparent_layers(&[front], &[back]) < 0);
    assert!(comp.sort_transparent_layers(&[back], &[front]) > 0);
    assert!(comp.sort_opaque_layers(&[102], &[front, back]) < 0);
}

#[test]
fn sort_with_unknown_ids() {
    let (world, keys) = world_with_layers(1);
    let mut comp = LayerComposition::new("unknown");
    comp.push(&world.layers, keys[0]);

    assert_eq!(comp.sort_opaque_layers(&[999], &[998]), 0);
    assert!(comp.sort_opaque_layers(&[100], &[999]) < 0);
    assert!(comp.sort_opaque_layers(&[999], &[100]) > 0);
}

// ============================================================================
// Notifications
// ============================================================================

#[test]
fn whole_layer_changes_notify_once() {
    let (world, keys) = world_with_layers(1);
    let layers = &world.layers;
    let mut comp = LayerComposition::new("events");
    let events = comp.subscribe();

    comp.push(layers, keys[0]);
    comp.remove(layers, keys[0]);

    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![CompositionEvent::Added(keys[0]), CompositionEvent::Removed(keys[0])]
    );
}

#[test]
fn sublayer_removal_notifies_when_layer_is_gone() {
    let (world, keys) = world_with_layers(1);
    let layers = &world.layers;
    let mut comp = LayerComposition::new("events");
    comp.push(layers, keys[0]);
    let events = comp.subscribe();

    comp.remove_opaque(layers, keys[0]);
    assert!(events.try_recv().is_err());

    comp.remove_transparent(layers, keys[0]);
    assert_eq!(events.try_recv().ok(), Some(CompositionEvent::Removed(keys[0])));
}

#[test]
fn duplicate_add_does_not_notify() {
    let (world, keys) = world_with_layers(1);
    let layers = &world.layers;
    let mut comp = LayerComposition::new("events");
    comp.push(layers, keys[0]);
    let events = comp.subscribe();

    comp.push(layers, keys[0]);
    comp.push_opaque(layers, keys[0]);
    assert!(events.try_recv().is_err());
}
