//! Rendering library resource
//!
//! Layer construction goes through a [`RenderLibrary`] that is loaded on first use.
//! [`SharedLibrary`] loads it once for all overlays: concurrent first users await the
//! same load, and the library stays resident afterwards. A failed load is not cached,
//! so the next replace tries again.

use super::style::{feature_label, style_for};
use super::surface::{RenderedLayer, StyledFeature};
use super::OverlaySlot;
use crate::error::UiResult;
use crate::session::ViewMode;
use async_trait::async_trait;
use scai_common::GeoFeatureCollection;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// Builds drawable layers from feature collections
pub trait RenderLibrary: Send + Sync {
    fn name(&self) -> &str;

    /// Build the layer object for `slot`
    ///
    /// The modified slot only renders roads the policy modified or closed.
    fn build_layer(
        &self,
        slot: OverlaySlot,
        collection: &GeoFeatureCollection,
        view_mode: ViewMode,
    ) -> RenderedLayer;
}

/// Asynchronous source of the rendering library
#[async_trait]
pub trait RenderLibraryLoader: Send + Sync {
    async fn load(&self) -> UiResult<Arc<dyn RenderLibrary>>;
}

/// Line renderer applying the overlay styling policy
#[derive(Debug, Default)]
pub struct StyledLineRenderer;

impl RenderLibrary for StyledLineRenderer {
    fn name(&self) -> &str {
        "styled-line"
    }

    fn build_layer(
        &self,
        slot: OverlaySlot,
        collection: &GeoFeatureCollection,
        view_mode: ViewMode,
    ) -> RenderedLayer {
        let style = style_for(slot);
        let features = collection
            .features
            .iter()
            .filter(|feature| match slot {
                OverlaySlot::Baseline => true,
                OverlaySlot::Modified => {
                    feature.properties.is_modified || feature.properties.is_closed
                }
            })
            .map(|feature| StyledFeature {
                edge_id: feature.properties.edge_id.clone(),
                geometry: feature.geometry.clone(),
                style: style(&feature.properties, view_mode),
                label: feature_label(&feature.properties),
            })
            .collect();

        RenderedLayer { slot, features }
    }
}

/// Loader for the built-in renderer
#[derive(Debug, Default)]
pub struct BuiltinLibraryLoader;

#[async_trait]
impl RenderLibraryLoader for BuiltinLibraryLoader {
    async fn load(&self) -> UiResult<Arc<dyn RenderLibrary>> {
        Ok(Arc::new(StyledLineRenderer))
    }
}

/// Load-once handle to the rendering library
pub struct SharedLibrary {
    loader: Arc<dyn RenderLibraryLoader>,
    cell: OnceCell<Arc<dyn RenderLibrary>>,
}

impl SharedLibrary {
    pub fn new(loader: Arc<dyn RenderLibraryLoader>) -> Self {
        Self {
            loader,
            cell: OnceCell::new(),
        }
    }

    /// Resolve the library, loading it if this is the first use
    pub async fn get(&self) -> UiResult<Arc<dyn RenderLibrary>> {
        let library = self
            .cell
            .get_or_try_init(|| async {
                let library = self.loader.load().await?;
                info!(library = library.name(), "Rendering library loaded");
                Ok::<_, crate::error::UiError>(library)
            })
            .await?;
        Ok(Arc::clone(library))
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UiError;
    use scai_common::geo::{FeatureProperties, GeoFeature, Geometry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        loads: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl RenderLibraryLoader for CountingLoader {
        async fn load(&self) -> UiResult<Arc<dyn RenderLibrary>> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail_first && n == 0 {
                return Err(UiError::RenderLoad("asset fetch failed".to_string()));
            }
            Ok(Arc::new(StyledLineRenderer))
        }
    }

    fn collection() -> GeoFeatureCollection {
        let edge = |modified: bool, closed: bool| GeoFeature {
            kind: "Feature".to_string(),
            geometry: Geometry::LineString {
                coordinates: vec![[76.2, 9.9], [76.21, 9.91]],
            },
            properties: FeatureProperties {
                is_modified: modified,
                is_closed: closed,
                ..Default::default()
            },
        };
        GeoFeatureCollection::new(vec![
            edge(true, false),
            edge(false, false),
            edge(false, true),
            edge(true, false),
            edge(false, false),
        ])
    }

    #[test]
    fn test_modified_layer_filters_unchanged_roads() {
        let renderer = StyledLineRenderer;
        let modified = renderer.build_layer(OverlaySlot::Modified, &collection(), ViewMode::After);
        let baseline = renderer.build_layer(OverlaySlot::Baseline, &collection(), ViewMode::After);

        assert_eq!(modified.len(), 3);
        assert_eq!(baseline.len(), 5);
        assert_eq!(modified.slot, OverlaySlot::Modified);
    }

    #[tokio::test]
    async fn test_concurrent_first_use_loads_once() {
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
            fail_first: false,
        });
        let shared = Arc::new(SharedLibrary::new(loader.clone()));

        let a = tokio::spawn({
            let shared = Arc::clone(&shared);
            async move { shared.get().await.is_ok() }
        });
        let b = tokio::spawn({
            let shared = Arc::clone(&shared);
            async move { shared.get().await.is_ok() }
        });

        assert!(a.await.unwrap());
        assert!(b.await.unwrap());
        assert!(shared.get().await.is_ok());
        assert!(shared.is_loaded());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
            fail_first: true,
        });
        let shared = SharedLibrary::new(loader.clone());

        assert!(matches!(shared.get().await, Err(UiError::RenderLoad(_))));
        assert!(!shared.is_loaded());
        assert!(shared.get().await.is_ok());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }
}
