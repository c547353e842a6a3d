//! Layer composition and render action compilation.
//!
//! - [`LayerComposition`]: ordered sublayer list with index repair and notifications
//! - [`RenderGraphCompiler`]: composition + cameras → ordered [`RenderAction`]s
//! - [`LightClusterAssigner`]: pooled light clusters shared between actions

pub mod compiler;
pub mod layer_composition;
pub mod light_clusters;
pub mod render_action;

pub use compiler::{RenderGraphCompiler, UpdateFlags};
pub use layer_composition::{CompositionEvent, LayerComposition};
pub use light_clusters::{ClusterKey, ClusterUniforms, LightClusterAssigner, WorldClusters};
pub use render_action::RenderAction;
