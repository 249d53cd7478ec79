//! Hierarchical patch grass.
//!
//! The terrain is tiled into leaf patches, each owning the attributes of a
//! fixed number of blades in device buffers. Patches are folded into a
//! bounding hierarchy that is frustum culled every frame; the visible
//! patches run the blade compute passes and one indirect draw each.

pub mod blade;
pub mod buffers;
pub mod config;
pub mod context;
pub mod culling;
pub mod debug;
pub mod hierarchy;
pub mod params;
pub mod patch;

pub use blade::{BladeAttributes, BladeGenerator, SharedBladePositions, TexRect};
pub use buffers::{DrawArgs, PatchBuffers};
pub use config::{DebugSettings, GrassSettings};
pub use context::{FrameStats, SimulationBuilder, SimulationContext};
pub use culling::{CullStats, PatchCuller};
pub use debug::DebugLine;
pub use hierarchy::{GridLayout, HierarchyBuilder, LeafId, NodeId, NodeKind, PatchHierarchy, PatchNode};
pub use params::{FrameParams, FrameTime};
pub use patch::{DrawResources, LeafPatch};
