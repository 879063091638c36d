//! Map surface and mount lifecycle
//!
//! A [`MapSurface`] holds the installed layers. [`MapMount`] guards its creation so a
//! surface is constructed at most once per mount, and stamps each mount with a
//! generation so late layer installs can tell the surface they targeted is gone.

use super::style::LayerStyle;
use super::OverlaySlot;
use scai_common::geo::Geometry;
use serde_json::{json, Value};
use tracing::debug;

/// Handle to an installed layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(u64);

/// One feature ready to draw
#[derive(Debug, Clone, PartialEq)]
pub struct StyledFeature {
    pub edge_id: Option<String>,
    pub geometry: Geometry,
    pub style: LayerStyle,
    pub label: String,
}

/// Layer object produced by the rendering library
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedLayer {
    pub slot: OverlaySlot,
    pub features: Vec<StyledFeature>,
}

impl RenderedLayer {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Drawing target for overlay layers
pub trait MapSurface: Send {
    fn add_layer(&mut self, layer: RenderedLayer) -> LayerId;

    /// Remove a layer; None if it was not installed
    fn remove_layer(&mut self, id: LayerId) -> Option<RenderedLayer>;

    /// Installed layers in draw order
    fn layers(&self) -> Vec<&RenderedLayer>;
}

/// In-memory surface that exports its layers as GeoJSON
#[derive(Debug, Default)]
pub struct GeoJsonSurface {
    next_id: u64,
    layers: Vec<(LayerId, RenderedLayer)>,
}

impl GeoJsonSurface {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MapSurface for GeoJsonSurface {
    fn add_layer(&mut self, layer: RenderedLayer) -> LayerId {
        self.next_id += 1;
        let id = LayerId(self.next_id);
        self.layers.push((id, layer));
        // Baseline always draws under the modified overlay
        self.layers.sort_by_key(|(_, layer)| layer.slot);
        id
    }

    fn remove_layer(&mut self, id: LayerId) -> Option<RenderedLayer> {
        let idx = self.layers.iter().position(|(layer_id, _)| *layer_id == id)?;
        Some(self.layers.remove(idx).1)
    }

    fn layers(&self) -> Vec<&RenderedLayer> {
        self.layers.iter().map(|(_, layer)| layer).collect()
    }
}

/// Export layers as one FeatureCollection with simplestyle properties
///
/// Readable by geojson.io and most GIS viewers.
pub fn export_simplestyle(layers: &[&RenderedLayer]) -> Value {
    let features: Vec<Value> = layers
        .iter()
        .flat_map(|layer| {
            layer.features.iter().map(move |feature| {
                let mut properties = json!({
                    "title": feature.label,
                    "overlay": layer.slot.to_string(),
                    "stroke": feature.style.color,
                    "stroke-width": feature.style.weight,
                    "stroke-opacity": feature.style.opacity,
                });
                if let Some(dash) = feature.style.dash {
                    properties["stroke-dasharray"] = json!(dash);
                }
                if let Some(edge_id) = &feature.edge_id {
                    properties["edge_id"] = json!(edge_id);
                }
                json!({
                    "type": "Feature",
                    "geometry": feature.geometry,
                    "properties": properties,
                })
            })
        })
        .collect();

    json!({ "type": "FeatureCollection", "features": features })
}

/// Mount guard for the map surface
#[derive(Default)]
pub struct MapMount {
    surface: Option<Box<dyn MapSurface>>,
    generation: u64,
}

impl MapMount {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the surface unless one is already mounted
    ///
    /// Returns true when `factory` ran.
    pub fn initialize_if_absent<F>(&mut self, factory: F) -> bool
    where
        F: FnOnce() -> Box<dyn MapSurface>,
    {
        if self.surface.is_some() {
            return false;
        }
        self.generation += 1;
        self.surface = Some(factory());
        debug!(generation = self.generation, "Map surface mounted");
        true
    }

    /// Dispose the surface; a later mount creates a fresh one
    pub fn teardown(&mut self) {
        if self.surface.take().is_some() {
            debug!(generation = self.generation, "Map surface torn down");
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.surface.is_some()
    }

    /// Generation of the current (or most recent) mount
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the mount identified by `generation` is still live
    pub fn is_live(&self, generation: u64) -> bool {
        self.surface.is_some() && self.generation == generation
    }

    pub fn surface(&self) -> Option<&dyn MapSurface> {
        self.surface.as_deref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut (dyn MapSurface + 'static)> {
        self.surface.as_deref_mut()
    }
}
