//! Layer Composition
//!
//! The ordered list of sublayers the scheduler walks every time it compiles
//! render actions. A layer occupies up to two slots, one per sub-collection
//! (opaque and transparent), and each slot has its own enable flag.
//!
//! # Layout
//!
//! ```text
//! index:              0        1        2        3
//! layer_list:        World    World    UI       UI
//! sub_layer_list:    false    true     false    true      (false = opaque)
//! sub_layer_enabled: true     true     true     false
//! ```
//!
//! The three vectors always have the same length. The lookup maps
//! (`id → layer`, `name → layer`) and the per-transparency order maps
//! (`id → slot index`) are repaired inside every mutation, so they are never
//! observable in a stale state. Insertions repair only the slots from the
//! insertion point onwards; whole-layer removal repairs everything.
//!
//! # Notifications
//!
//! Observers registered with [`LayerComposition::subscribe`] receive exactly
//! one [`CompositionEvent`] per logical change. A whole-layer `push` touches
//! two slots but is still a single `Added`; removing one sub-collection only
//! reports `Removed` once no slot of that layer is left.

use log::warn;
use rustc_hash::FxHashMap;

use crate::scene::{LayerId, LayerKey, Layers};

/// Structural change of a [`LayerComposition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionEvent {
    Added(LayerKey),
    Removed(LayerKey),
}

pub struct LayerComposition {
    name: String,

    // === Sublayer arrays (parallel, same length) ===
    layer_list: Vec<LayerKey>,
    sub_layer_list: Vec<bool>,
    sub_layer_enabled: Vec<bool>,

    // === Derived lookups ===
    layer_id_map: FxHashMap<LayerId, LayerKey>,
    layer_name_map: FxHashMap<String, LayerKey>,
    // Layer id → slot index of its opaque / transparent sublayer.
    opaque_order: FxHashMap<LayerId, usize>,
    transparent_order: FxHashMap<LayerId, usize>,

    dirty: bool,
    observers: Vec<flume::Sender<CompositionEvent>>,
}

impl Default for LayerComposition {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

impl LayerComposition {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layer_list: Vec::new(),
            sub_layer_list: Vec::new(),
            sub_layer_enabled: Vec::new(),
            layer_id_map: FxHashMap::default(),
            layer_name_map: FxHashMap::default(),
            opaque_order: FxHashMap::default(),
            transparent_order: FxHashMap::default(),
            dirty: false,
            observers: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers an observer. Dropping the receiver unsubscribes it.
    pub fn subscribe(&mut self) -> flume::Receiver<CompositionEvent> {
        let (tx, rx) = flume::unbounded();
        self.observers.push(tx);
        rx
    }

    // ========================================================================
    // Read access
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.layer_list.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layer_list.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn layer_list(&self) -> &[LayerKey] {
        &self.layer_list
    }

    /// `true` marks a transparent sublayer.
    #[inline]
    #[must_use]
    pub fn sub_layer_list(&self) -> &[bool] {
        &self.sub_layer_list
    }

    #[inline]
    #[must_use]
    pub fn sub_layer_enabled(&self) -> &[bool] {
        &self.sub_layer_enabled
    }

    /// Iterates `(layer, transparent, sublayer_enabled)` in render order.
    pub fn sublayers(&self) -> impl Iterator<Item = (LayerKey, bool, bool)> + '_ {
        self.layer_list
            .iter()
            .zip(&self.sub_layer_list)
            .zip(&self.sub_layer_enabled)
            .map(|((key, transparent), enabled)| (*key, *transparent, *enabled))
    }

    pub fn set_sublayer_enabled(&mut self, index: usize, enabled: bool) {
        let Some(slot) = self.sub_layer_enabled.get_mut(index) else {
            warn!(
                "Composition '{}': sublayer index {index} out of range ({})",
                self.name,
                self.layer_list.len()
            );
            return;
        };
        if *slot != enabled {
            *slot = enabled;
            self.dirty = true;
        }
    }

    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Forces a recompile on the next update.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    #[must_use]
    pub fn get_layer_by_id(&self, id: LayerId) -> Option<LayerKey> {
        self.layer_id_map.get(&id).copied()
    }

    #[must_use]
    pub fn get_layer_by_name(&self, name: &str) -> Option<LayerKey> {
        self.layer_name_map.get(name).copied()
    }

    /// Slot index of the layer's opaque sublayer.
    #[must_use]
    pub fn get_opaque_index(&self, layer: LayerKey) -> Option<usize> {
        self.sublayer_index(layer, false)
    }

    /// Slot index of the layer's transparent sublayer.
    #[must_use]
    pub fn get_transparent_index(&self, layer: LayerKey) -> Option<usize> {
        self.sublayer_index(layer, true)
    }

    fn sublayer_index(&self, layer: LayerKey, transparent: bool) -> Option<usize> {
        self.layer_list
            .iter()
            .zip(&self.sub_layer_list)
            .position(|(key, t)| *key == layer && *t == transparent)
    }

    #[inline]
    fn is_layer_added(&self, layer: LayerKey) -> bool {
        self.layer_list.contains(&layer)
    }

    #[inline]
    fn is_sublayer_added(&self, layer: LayerKey, transparent: bool) -> bool {
        self.sublayer_index(layer, transparent).is_some()
    }

    // ========================================================================
    // Draw-order queries
    // ========================================================================

    /// Compares two groups of layers by their topmost opaque sublayer.
    ///
    /// Negative when some layer of `layers_a` is drawn after every layer of
    /// `layers_b`, positive for the reverse, zero when indistinguishable.
    #[must_use]
    pub fn sort_opaque_layers(&self, layers_a: &[LayerId], layers_b: &[LayerId]) -> i32 {
        sort_layers_descending(layers_a, layers_b, &self.opaque_order)
    }

    /// Same as [`sort_opaque_layers`](Self::sort_opaque_layers) for the
    /// transparent sublayers.
    #[must_use]
    pub fn sort_transparent_layers(&self, layers_a: &[LayerId], layers_b: &[LayerId]) -> i32 {
        sort_layers_descending(layers_a, layers_b, &self.transparent_order)
    }

    // ========================================================================
    // Whole-layer mutation
    // ========================================================================

    /// Appends both sublayers of `layer`.
    pub fn push(&mut self, layers: &Layers, layer: LayerKey) {
        let len = self.layer_list.len();
        self.insert(layers, layer, len);
    }

    /// Inserts both sublayers of `layer` at `index` (opaque first).
    pub fn insert(&mut self, layers: &Layers, layer: LayerKey, index: usize) {
        if !self.check_addable(layers, layer) {
            return;
        }
        if self.is_layer_added(layer) {
            warn!(
                "Composition '{}': layer '{}' is already added",
                self.name,
                layer_name(layers, layer)
            );
            return;
        }
        let index = self.clamp_index(index);

        for (offset, transparent) in [false, true].into_iter().enumerate() {
            self.layer_list.insert(index + offset, layer);
            self.sub_layer_list.insert(index + offset, transparent);
            self.sub_layer_enabled.insert(index + offset, true);
        }

        self.repair_order(layers, index, false);
        self.repair_order(layers, index, true);
        self.refresh_lookup(layers, layer);
        self.dirty = true;
        self.fire(CompositionEvent::Added(layer));
    }

    /// Removes every sublayer of `layer`.
    pub fn remove(&mut self, layers: &Layers, layer: LayerKey) {
        if !self.is_layer_added(layer) {
            warn!(
                "Composition '{}': cannot remove layer '{}', it is not added",
                self.name,
                layer_name(layers, layer)
            );
            return;
        }

        while let Some(index) = self.layer_list.iter().position(|key| *key == layer) {
            self.layer_list.remove(index);
            self.sub_layer_list.remove(index);
            self.sub_layer_enabled.remove(index);
        }

        self.opaque_order.clear();
        self.transparent_order.clear();
        self.repair_order(layers, 0, false);
        self.repair_order(layers, 0, true);
        self.rebuild_lookups(layers);
        self.dirty = true;
        self.fire(CompositionEvent::Removed(layer));
    }

    // ========================================================================
    // Sublayer mutation
    // ========================================================================

    pub fn push_opaque(&mut self, layers: &Layers, layer: LayerKey) {
        let len = self.layer_list.len();
        self.insert_sublayer(layers, layer, len, false);
    }

    pub fn insert_opaque(&mut self, layers: &Layers, layer: LayerKey, index: usize) {
        self.insert_sublayer(layers, layer, index, false);
    }

    pub fn remove_opaque(&mut self, layers: &Layers, layer: LayerKey) {
        self.remove_sublayer(layers, layer, false);
    }

    pub fn push_transparent(&mut self, layers: &Layers, layer: LayerKey) {
        let len = self.layer_list.len();
        self.insert_sublayer(layers, layer, len, true);
    }

    pub fn insert_transparent(&mut self, layers: &Layers, layer: LayerKey, index: usize) {
        self.insert_sublayer(layers, layer, index, true);
    }

    pub fn remove_transparent(&mut self, layers: &Layers, layer: LayerKey) {
        self.remove_sublayer(layers, layer, true);
    }

    fn insert_sublayer(&mut self, layers: &Layers, layer: LayerKey, index: usize, transparent: bool) {
        if !self.check_addable(layers, layer) {
            return;
        }
        if self.is_sublayer_added(layer, transparent) {
            warn!(
                "Composition '{}': {} sublayer of '{}' is already added",
                self.name,
                sublayer_kind(transparent),
                layer_name(layers, layer)
            );
            return;
        }
        let index = self.clamp_index(index);

        self.layer_list.insert(index, layer);
        self.sub_layer_list.insert(index, transparent);
        self.sub_layer_enabled.insert(index, true);

        // Every slot after `index` moved, regardless of its transparency.
        self.repair_order(layers, index, false);
        self.repair_order(layers, index, true);
        self.refresh_lookup(layers, layer);
        self.dirty = true;
        self.fire(CompositionEvent::Added(layer));
    }

    fn remove_sublayer(&mut self, layers: &Layers, layer: LayerKey, transparent: bool) {
        let Some(index) = self.sublayer_index(layer, transparent) else {
            warn!(
                "Composition '{}': cannot remove {} sublayer of '{}', it is not added",
                self.name,
                sublayer_kind(transparent),
                layer_name(layers, layer)
            );
            return;
        };

        self.layer_list.remove(index);
        self.sub_layer_list.remove(index);
        self.sub_layer_enabled.remove(index);

        if let Some(removed) = layers.get(layer) {
            let order = if transparent {
                &mut self.transparent_order
            } else {
                &mut self.opaque_order
            };
            if order.get(&removed.id()) == Some(&index) {
                order.remove(&removed.id());
            }
        }
        self.repair_order(layers, index, false);
        self.repair_order(layers, index, true);
        self.refresh_lookup(layers, layer);
        self.dirty = true;

        if !self.is_layer_added(layer) {
            self.fire(CompositionEvent::Removed(layer));
        }
    }

    // ========================================================================
    // Internal repair
    // ========================================================================

    fn check_addable(&self, layers: &Layers, layer: LayerKey) -> bool {
        let Some(new_layer) = layers.get(layer) else {
            warn!("Composition '{}': unknown layer {layer:?}", self.name);
            return false;
        };
        if let Some(existing) = self.layer_id_map.get(&new_layer.id())
            && *existing != layer
        {
            warn!(
                "Composition '{}': layer id {} of '{}' is already used by '{}'",
                self.name,
                new_layer.id(),
                new_layer.name(),
                layer_name(layers, *existing)
            );
        }
        true
    }

    fn clamp_index(&self, index: usize) -> usize {
        if index > self.layer_list.len() {
            warn!(
                "Composition '{}': insert index {index} past the end ({}), appending",
                self.name,
                self.layer_list.len()
            );
            self.layer_list.len()
        } else {
            index
        }
    }

    /// Rewrites the order entries of every slot at or after `start`.
    fn repair_order(&mut self, layers: &Layers, start: usize, transparent: bool) {
        let order = if transparent {
            &mut self.transparent_order
        } else {
            &mut self.opaque_order
        };
        for index in start..self.layer_list.len() {
            if self.sub_layer_list[index] != transparent {
                continue;
            }
            if let Some(layer) = layers.get(self.layer_list[index]) {
                order.insert(layer.id(), index);
            }
        }
    }

    /// Re-derives the id and name entries for `layer`: the first slot in
    /// render order carrying that id (name) wins.
    fn refresh_lookup(&mut self, layers: &Layers, layer: LayerKey) {
        let Some(changed) = layers.get(layer) else {
            self.rebuild_lookups(layers);
            return;
        };
        let id = changed.id();
        let name = changed.name();

        let by_id = self
            .layer_list
            .iter()
            .copied()
            .find(|key| layers.get(*key).is_some_and(|l| l.id() == id));
        match by_id {
            Some(key) => {
                self.layer_id_map.insert(id, key);
            }
            None => {
                self.layer_id_map.remove(&id);
            }
        }

        let by_name = self
            .layer_list
            .iter()
            .copied()
            .find(|key| layers.get(*key).is_some_and(|l| l.name() == name));
        match by_name {
            Some(key) => {
                self.layer_name_map.insert(name.to_string(), key);
            }
            None => {
                self.layer_name_map.remove(name);
            }
        }
    }

    fn rebuild_lookups(&mut self, layers: &Layers) {
        self.layer_id_map.clear();
        self.layer_name_map.clear();
        for key in &self.layer_list {
            if let Some(layer) = layers.get(*key) {
                self.layer_id_map.entry(layer.id()).or_insert(*key);
                self.layer_name_map
                    .entry(layer.name().to_string())
                    .or_insert(*key);
            }
        }
    }

    fn fire(&mut self, event: CompositionEvent) {
        self.observers.retain(|tx| tx.send(event).is_ok());
    }
}

fn sort_layers_descending(
    layers_a: &[LayerId],
    layers_b: &[LayerId],
    order: &FxHashMap<LayerId, usize>,
) -> i32 {
    let top = |ids: &[LayerId]| ids.iter().filter_map(|id| order.get(id).copied()).max();

    match (top(layers_a), top(layers_b)) {
        (None, None) => 0,
        (None, Some(_)) => 1,
        (Some(_), None) => -1,
        (Some(a), Some(b)) => match b.cmp(&a) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        },
    }
}

fn layer_name(layers: &Layers, layer: LayerKey) -> &str {
    layers.get(layer).map_or("<unknown>", |l| l.name())
}

fn sublayer_kind(transparent: bool) -> &'static str {
    if transparent { "transparent" } else { "opaque" }
}
