//! Light Clusters
//!
//! A [`WorldClusters`] is a world-space 3D cell grid over the volumes of a set
//! of local lights. Each cell lists up to `max_lights_per_cell` light indices;
//! index 0 is reserved for "no light", so a cell's list ends at the first 0.
//!
//! # Assignment
//!
//! Clusters are keyed implicitly by the set of clustered lights of the layer a
//! render action draws. [`LightClusterAssigner::assign`] runs after every
//! compile:
//!
//! ```text
//! previous clusters ──► pool
//! for each action:
//!     layer has clustered lights and instances?
//!         ├─ earlier action, same layer or same light set ─► share its cluster
//!         └─ otherwise ─► pool.pop() or allocate ─► "Cluster-N"
//!     else ─► shared empty cluster (created once)
//! pool leftovers ──► destroyed
//! ```
//!
//! Pool reuse is in the previous compile's order, so recompiling an unchanged
//! composition hands out the same cluster keys.

use bytemuck::{Pod, Zeroable};
use glam::{UVec3, Vec3};
use log::{debug, warn};
use slotmap::{SlotMap, new_key_type};

use super::render_action::RenderAction;
use crate::settings::ClusterSettings;
use crate::scene::{LayerKey, Layers, Light, LightKey, Lights};

new_key_type! {
    pub struct ClusterKey;
}

/// Largest light index a cell can store (`u8`, 0 reserved).
pub const MAX_CLUSTER_LIGHTS: usize = 255;

/// Grid parameters uploaded alongside the cell data.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ClusterUniforms {
    pub bounds_min: Vec3,
    pub _pad0: f32,
    pub bounds_range: Vec3,
    pub _pad1: f32,
    pub cells: UVec3,
    pub max_lights_per_cell: u32,
}

#[derive(Debug)]
pub struct WorldClusters {
    name: String,
    cells: UVec3,
    max_lights_per_cell: u32,

    // Layer whose clustered lights fill this grid.
    source_layer: Option<LayerKey>,

    bounds_min: Vec3,
    bounds_max: Vec3,

    // Slot `i` holds light index `i + 1` in the cell data.
    lights: Vec<LightKey>,
    cell_data: Vec<u8>,
}

impl WorldClusters {
    #[must_use]
    pub fn new(settings: &ClusterSettings) -> Self {
        let cells = UVec3::from_array(settings.cells);
        let cell_count = (cells.x * cells.y * cells.z) as usize;
        Self {
            name: String::new(),
            cells,
            max_lights_per_cell: settings.max_lights_per_cell,
            source_layer: None,
            bounds_min: Vec3::ZERO,
            bounds_max: Vec3::ZERO,
            lights: Vec::new(),
            cell_data: vec![0; cell_count * settings.max_lights_per_cell as usize],
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn lights(&self) -> &[LightKey] {
        &self.lights
    }

    #[inline]
    #[must_use]
    pub fn cell_data(&self) -> &[u8] {
        &self.cell_data
    }

    #[inline]
    #[must_use]
    pub fn source_layer(&self) -> Option<LayerKey> {
        self.source_layer
    }

    #[must_use]
    pub fn uniforms(&self) -> ClusterUniforms {
        ClusterUniforms {
            bounds_min: self.bounds_min,
            _pad0: 0.0,
            bounds_range: self.bounds_max - self.bounds_min,
            _pad1: 0.0,
            cells: self.cells,
            max_lights_per_cell: self.max_lights_per_cell,
        }
    }

    /// Light indices (1-based) referenced by the cell at `cell`.
    pub fn cell_lights(&self, cell: UVec3) -> impl Iterator<Item = u8> + '_ {
        let start = self.cell_offset(cell);
        let end = start + self.max_lights_per_cell as usize;
        self.cell_data[start..end]
            .iter()
            .copied()
            .take_while(|index| *index != 0)
    }

    fn cell_offset(&self, cell: UVec3) -> usize {
        let cell = cell.min(self.cells - UVec3::ONE);
        let linear = cell.x + self.cells.x * (cell.y + self.cells.y * cell.z);
        linear as usize * self.max_lights_per_cell as usize
    }

    /// Rebuilds the grid from the given local lights.
    pub fn update<'a>(&mut self, lights: impl IntoIterator<Item = (LightKey, &'a Light)>) {
        self.lights.clear();
        self.cell_data.fill(0);

        let mut bounds: Vec<(Vec3, Vec3)> = Vec::new();
        for (key, light) in lights {
            let Some(range) = light.kind().range() else {
                continue;
            };
            if !light.enabled() {
                continue;
            }
            if self.lights.len() == MAX_CLUSTER_LIGHTS - 1 {
                warn!(
                    "{}: more than {} clustered lights, the rest are ignored",
                    self.name,
                    MAX_CLUSTER_LIGHTS - 1
                );
                break;
            }
            self.lights.push(key);
            let extent = Vec3::splat(range.max(0.0));
            bounds.push((light.position() - extent, light.position() + extent));
        }

        let Some(first) = bounds.first() else {
            self.bounds_min = Vec3::ZERO;
            self.bounds_max = Vec3::ZERO;
            return;
        };
        let (min, max) = bounds
            .iter()
            .fold(*first, |(min, max), (lo, hi)| (min.min(*lo), max.max(*hi)));
        self.bounds_min = min;
        self.bounds_max = max;

        let size = (max - min).max(Vec3::splat(f32::EPSILON));
        let cells_f = self.cells.as_vec3();
        let last_cell = self.cells - UVec3::ONE;
        let per_cell = self.max_lights_per_cell as usize;

        for (slot, (lo, hi)) in bounds.iter().enumerate() {
            let light_index = (slot + 1) as u8;
            let cell_min = (((*lo - min) / size) * cells_f).floor().as_uvec3().min(last_cell);
            let cell_max = (((*hi - min) / size) * cells_f).floor().as_uvec3().min(last_cell);

            for z in cell_min.z..=cell_max.z {
                for y in cell_min.y..=cell_max.y {
                    for x in cell_min.x..=cell_max.x {
                        let offset = self.cell_offset(UVec3::new(x, y, z));
                        let cell = &mut self.cell_data[offset..offset + per_cell];
                        if let Some(free) = cell.iter_mut().find(|index| **index == 0) {
                            *free = light_index;
                        }
                    }
                }
            }
        }
    }
}

/// Owns every light cluster and assigns them to render actions.
pub struct LightClusterAssigner {
    settings: ClusterSettings,
    clusters: SlotMap<ClusterKey, WorldClusters>,
    // Clusters assigned by the last compile, in assignment order.
    active: Vec<ClusterKey>,
    empty: Option<ClusterKey>,
    pool: Vec<ClusterKey>,
}

impl LightClusterAssigner {
    #[must_use]
    pub fn new(settings: ClusterSettings) -> Self {
        Self {
            settings,
            clusters: SlotMap::with_key(),
            active: Vec::new(),
            empty: None,
            pool: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, key: ClusterKey) -> Option<&WorldClusters> {
        self.clusters.get(key)
    }

    /// Number of non-empty clusters assigned by the last compile.
    #[inline]
    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.active.len()
    }

    /// Clusters allocated in total, including the empty cluster.
    #[inline]
    #[must_use]
    pub fn allocated_count(&self) -> usize {
        self.clusters.len()
    }

    #[inline]
    #[must_use]
    pub fn active_clusters(&self) -> &[ClusterKey] {
        &self.active
    }

    #[inline]
    #[must_use]
    pub fn empty_cluster(&self) -> Option<ClusterKey> {
        self.empty
    }

    fn get_or_create_empty(&mut self) -> ClusterKey {
        if let Some(key) = self.empty {
            return key;
        }
        let mut clusters = WorldClusters::new(&self.settings);
        clusters.name = "Cluster-Empty".to_string();
        let key = self.clusters.insert(clusters);
        self.empty = Some(key);
        key
    }

    /// Assigns a cluster to every action.
    pub fn assign(&mut self, actions: &mut [RenderAction], layers: &Layers) {
        // Reversed so that `pop` hands clusters out in their previous order.
        self.pool.extend(self.active.drain(..).rev());
        let empty = self.get_or_create_empty();

        for index in 0..actions.len() {
            let (before, rest) = actions.split_at_mut(index);
            let action = &mut rest[0];
            action.light_clusters = None;

            let layer = action
                .layer
                .and_then(|key| layers.get(key).map(|layer| (key, layer)));
            if let Some((layer_key, layer)) = layer
                && layer.has_clustered_lights()
                && !layer.instances(action.transparent).is_empty()
            {
                let cluster = match find_compatible_cluster(before, layer_key, layers, empty) {
                    Some(key) => key,
                    None => self.take_cluster(layer_key),
                };
                action.light_clusters = Some(cluster);
            }

            if action.light_clusters.is_none() {
                action.light_clusters = Some(empty);
            }
        }

        for key in self.pool.drain(..) {
            if let Some(clusters) = self.clusters.remove(key) {
                debug!("Destroyed unused light cluster '{}'", clusters.name);
            }
        }
    }

    fn take_cluster(&mut self, layer: LayerKey) -> ClusterKey {
        let name = format!("Cluster-{}", self.active.len());
        let key = match self.pool.pop() {
            Some(key) => key,
            None => {
                debug!("Allocating light cluster '{name}'");
                self.clusters.insert(WorldClusters::new(&self.settings))
            }
        };
        if let Some(clusters) = self.clusters.get_mut(key) {
            clusters.name = name;
            clusters.source_layer = Some(layer);
        }
        self.active.push(key);
        key
    }

    /// Refreshes the cell grid of every assigned cluster from its layer's
    /// clustered lights. Called once per frame.
    pub fn update_clusters(&mut self, layers: &Layers, lights: &Lights) {
        for key in &self.active {
            let Some(clusters) = self.clusters.get_mut(*key) else {
                continue;
            };
            let Some(layer) = clusters.source_layer.and_then(|l| layers.get(l)) else {
                clusters.update(std::iter::empty());
                continue;
            };
            let clustered = layer
                .lights()
                .iter()
                .filter(|key| layer.clustered_lights().contains(*key))
                .filter_map(|key| lights.get(*key).map(|light| (*key, light)));
            clusters.update(clustered);
        }
    }

    /// Releases every cluster, including the empty one.
    pub fn destroy(&mut self) {
        self.clusters.clear();
        self.active.clear();
        self.pool.clear();
        self.empty = None;
    }
}

fn find_compatible_cluster(
    earlier: &[RenderAction],
    layer_key: LayerKey,
    layers: &Layers,
    empty: ClusterKey,
) -> Option<ClusterKey> {
    let layer = layers.get(layer_key)?;
    earlier.iter().find_map(|ra| {
        let cluster = ra.light_clusters.filter(|key| *key != empty)?;
        if ra.layer == Some(layer_key) {
            return Some(cluster);
        }
        let other = ra.layer.and_then(|key| layers.get(key))?;
        (other.clustered_lights() == layer.clustered_lights()).then_some(cluster)
    })
}
