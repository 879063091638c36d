//! Map layer synchronizer
//!
//! Two overlays share one map surface:
//! - `Baseline`: the city road network coloured by congestion
//! - `Modified`: only the roads the policy changed or closed
//!
//! Layers are built by a rendering library that loads asynchronously the first time
//! it is needed. [`LayerSynchronizer`] keeps the surface consistent with the latest
//! requested collection per slot, whatever order the loads resolve in.

mod library;
mod style;
mod surface;
mod sync;

pub use library::{
    BuiltinLibraryLoader, RenderLibrary, RenderLibraryLoader, SharedLibrary, StyledLineRenderer,
};
pub use style::{feature_label, style_for, LayerStyle, StyleFn};
pub use surface::{
    export_simplestyle, GeoJsonSurface, LayerId, MapMount, MapSurface, RenderedLayer,
    StyledFeature,
};
pub use sync::{InstallOutcome, LayerSynchronizer};

use std::fmt;

/// Overlay slot on the map surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OverlaySlot {
    Baseline,
    Modified,
}

impl OverlaySlot {
    pub const ALL: [OverlaySlot; 2] = [OverlaySlot::Baseline, OverlaySlot::Modified];

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for OverlaySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverlaySlot::Baseline => "baseline",
            OverlaySlot::Modified => "modified",
        })
    }
}
