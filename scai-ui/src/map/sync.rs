//! Layer synchronizer
//!
//! `replace` records a pending install under a per-slot sequence number before the
//! rendering library is awaited. When the load resolves the install only proceeds if
//! that sequence number is still the latest for the slot and the surface it targeted
//! is still mounted. Rapid replaces therefore leave exactly one layer, built from
//! the last collection requested.
//!
//! State lives behind a std mutex that is never held across an await.

use super::library::{RenderLibraryLoader, SharedLibrary};
use super::surface::{LayerId, MapMount, MapSurface, RenderedLayer};
use super::OverlaySlot;
use crate::session::ViewMode;
use scai_common::GeoFeatureCollection;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// What happened to one `replace` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    /// A newer replace or clear for the slot arrived first
    Superseded,
    /// The surface was torn down or remounted before the library resolved
    SurfaceGone,
    /// Rendering library failed to load; the slot was left empty
    LoadFailed,
}

#[derive(Default)]
struct SlotState {
    seq: u64,
    installed: Option<LayerId>,
    /// Collection behind the installed (or pending) layer, kept for restyling
    source: Option<GeoFeatureCollection>,
}

#[derive(Default)]
struct SyncState {
    mount: MapMount,
    slots: [SlotState; 2],
    view_mode: ViewMode,
}

impl SyncState {
    fn remove_installed(&mut self, slot: OverlaySlot) {
        let installed = self.slots[slot.index()].installed.take();
        if let (Some(id), Some(surface)) = (installed, self.mount.surface_mut()) {
            surface.remove_layer(id);
        }
    }
}

/// Sole writer of the map surface's overlay layers
#[derive(Clone)]
pub struct LayerSynchronizer {
    state: Arc<Mutex<SyncState>>,
    library: Arc<SharedLibrary>,
    tracker: TaskTracker,
}

impl LayerSynchronizer {
    pub fn new(loader: Arc<dyn RenderLibraryLoader>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SyncState::default())),
            library: Arc::new(SharedLibrary::new(loader)),
            tracker: TaskTracker::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mount the surface unless one is already mounted; true if `factory` ran
    pub fn mount<F>(&self, factory: F) -> bool
    where
        F: FnOnce() -> Box<dyn MapSurface>,
    {
        self.lock().mount.initialize_if_absent(factory)
    }

    /// Dispose the surface; pending installs for it are skipped
    pub fn teardown(&self) {
        let mut state = self.lock();
        state.mount.teardown();
        for slot in state.slots.iter_mut() {
            slot.installed = None;
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.lock().mount.is_mounted()
    }

    pub fn view_mode(&self) -> ViewMode {
        self.lock().view_mode
    }

    /// Replace the layer in `slot` with one built from `collection`
    ///
    /// The pending replace is recorded before this returns; the install itself runs
    /// in a spawned task once the rendering library is available. Must be called from
    /// within a tokio runtime.
    pub fn replace(
        &self,
        slot: OverlaySlot,
        collection: GeoFeatureCollection,
    ) -> JoinHandle<InstallOutcome> {
        let (seq, generation) = {
            let mut state = self.lock();
            let generation = state.mount.generation();
            let entry = &mut state.slots[slot.index()];
            entry.seq += 1;
            entry.source = Some(collection.clone());
            (entry.seq, generation)
        };
        debug!(slot = %slot, seq, features = collection.len(), "Layer replace requested");

        let this = self.clone();
        self.tracker
            .spawn(async move { this.install(slot, seq, generation, collection).await })
    }

    async fn install(
        &self,
        slot: OverlaySlot,
        seq: u64,
        generation: u64,
        collection: GeoFeatureCollection,
    ) -> InstallOutcome {
        let library = self.library.get().await;

        let mut state = self.lock();
        if !state.mount.is_live(generation) {
            debug!(slot = %slot, seq, "Surface gone, skipping layer install");
            return InstallOutcome::SurfaceGone;
        }
        if state.slots[slot.index()].seq != seq {
            debug!(slot = %slot, seq, "Layer replace superseded");
            return InstallOutcome::Superseded;
        }

        let library = match library {
            Ok(library) => library,
            Err(e) => {
                warn!(slot = %slot, error = %e, "Rendering library unavailable, leaving slot empty");
                state.remove_installed(slot);
                return InstallOutcome::LoadFailed;
            }
        };

        let layer = library.build_layer(slot, &collection, state.view_mode);
        state.remove_installed(slot);

        let feature_count = layer.len();
        let Some(surface) = state.mount.surface_mut() else {
            return InstallOutcome::SurfaceGone;
        };
        let id = surface.add_layer(layer);
        state.slots[slot.index()].installed = Some(id);
        debug!(slot = %slot, seq, feature_count, "Layer installed");
        InstallOutcome::Installed
    }

    /// Remove the slot's layer and invalidate pending replaces
    pub fn clear(&self, slot: OverlaySlot) {
        let mut state = self.lock();
        let entry = &mut state.slots[slot.index()];
        entry.seq += 1;
        entry.source = None;
        state.remove_installed(slot);
    }

    /// Switch view mode and restyle the baseline overlay
    ///
    /// Returns the restyle install when a baseline collection is present.
    pub fn set_view_mode(&self, view_mode: ViewMode) -> Option<JoinHandle<InstallOutcome>> {
        let source = {
            let mut state = self.lock();
            if state.view_mode == view_mode {
                return None;
            }
            state.view_mode = view_mode;
            state.slots[OverlaySlot::Baseline.index()].source.clone()
        };
        source.map(|collection| self.replace(OverlaySlot::Baseline, collection))
    }

    /// Wait until every spawned install has resolved
    pub async fn settle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Copy of the layer installed in `slot`
    pub fn installed(&self, slot: OverlaySlot) -> Option<RenderedLayer> {
        let state = self.lock();
        let surface = state.mount.surface()?;
        surface.layers().into_iter().find(|layer| layer.slot == slot).cloned()
    }

    /// Number of layers on the surface (0 when unmounted)
    pub fn layer_count(&self) -> usize {
        self.lock().mount.surface().map_or(0, |surface| surface.layers().len())
    }

    /// Export the surface as simplestyle GeoJSON, None when unmounted
    pub fn export(&self) -> Option<serde_json::Value> {
        let state = self.lock();
        let surface = state.mount.surface()?;
        Some(super::surface::export_simplestyle(&surface.layers()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{UiError, UiResult};
    use crate::map::library::{BuiltinLibraryLoader, RenderLibrary, StyledLineRenderer};
    use crate::map::surface::GeoJsonSurface;
    use async_trait::async_trait;
    use scai_common::geo::{FeatureProperties, GeoFeature, Geometry, TextOrList};
    use tokio::sync::Notify;

    struct GatedLoader {
        gate: Arc<Notify>,
        fail: bool,
    }

    #[async_trait]
    impl RenderLibraryLoader for GatedLoader {
        async fn load(&self) -> UiResult<Arc<dyn RenderLibrary>> {
            self.gate.notified().await;
            if self.fail {
                return Err(UiError::RenderLoad("script blocked".to_string()));
            }
            Ok(Arc::new(StyledLineRenderer))
        }
    }

    fn gated(fail: bool) -> (LayerSynchronizer, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let sync = LayerSynchronizer::new(Arc::new(GatedLoader {
            gate: Arc::clone(&gate),
            fail,
        }));
        sync.mount(|| Box::new(GeoJsonSurface::new()));
        (sync, gate)
    }

    fn named_collection(name: &str, count: usize) -> GeoFeatureCollection {
        GeoFeatureCollection::new(
            (0..count)
                .map(|i| GeoFeature {
                    kind: "Feature".to_string(),
                    geometry: Geometry::LineString {
                        coordinates: vec![[76.2, 9.9], [76.2 + i as f64 * 0.001, 9.91]],
                    },
                    properties: FeatureProperties {
                        name: Some(TextOrList::Text(name.to_string())),
                        is_modified: true,
                        ..Default::default()
                    },
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_rapid_replaces_install_only_latest() {
        let (sync, gate) = gated(false);

        let handles: Vec<_> = (1..=5)
            .map(|n| sync.replace(OverlaySlot::Modified, named_collection(&format!("v{}", n), n)))
            .collect();
        tokio::task::yield_now().await;
        gate.notify_one();

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        assert_eq!(
            outcomes.iter().filter(|o| **o == InstallOutcome::Installed).count(),
            1
        );
        assert_eq!(outcomes[4], InstallOutcome::Installed);
        assert_eq!(sync.layer_count(), 1);

        let layer = sync.installed(OverlaySlot::Modified).unwrap();
        assert_eq!(layer.len(), 5);
        assert!(layer.features[0].label.starts_with("v5"));
    }

    #[tokio::test]
    async fn test_teardown_before_load_skips_install() {
        let (sync, gate) = gated(false);
        let handle = sync.replace(OverlaySlot::Baseline, named_collection("a", 2));

        sync.teardown();
        tokio::task::yield_now().await;
        gate.notify_one();

        assert_eq!(handle.await.unwrap(), InstallOutcome::SurfaceGone);
        assert_eq!(sync.layer_count(), 0);
    }

    #[tokio::test]
    async fn test_remount_before_load_skips_install() {
        let (sync, gate) = gated(false);
        let handle = sync.replace(OverlaySlot::Baseline, named_collection("a", 2));

        sync.teardown();
        assert!(sync.mount(|| Box::new(GeoJsonSurface::new())));
        tokio::task::yield_now().await;
        gate.notify_one();

        assert_eq!(handle.await.unwrap(), InstallOutcome::SurfaceGone);
        assert_eq!(sync.layer_count(), 0);
    }

    #[tokio::test]
    async fn test_load_failure_leaves_slot_empty() {
        let (sync, gate) = gated(true);
        let handle = sync.replace(OverlaySlot::Modified, named_collection("a", 1));
        tokio::task::yield_now().await;
        gate.notify_one();

        assert_eq!(handle.await.unwrap(), InstallOutcome::LoadFailed);
        assert!(sync.installed(OverlaySlot::Modified).is_none());
    }

    #[tokio::test]
    async fn test_clear_invalidates_pending_replace() {
        let (sync, gate) = gated(false);
        let handle = sync.replace(OverlaySlot::Modified, named_collection("a", 1));
        sync.clear(OverlaySlot::Modified);
        tokio::task::yield_now().await;
        gate.notify_one();

        assert_eq!(handle.await.unwrap(), InstallOutcome::Superseded);
        assert_eq!(sync.layer_count(), 0);
    }

    #[tokio::test]
    async fn test_slots_are_independent() {
        let sync = LayerSynchronizer::new(Arc::new(BuiltinLibraryLoader));
        sync.mount(|| Box::new(GeoJsonSurface::new()));

        sync.replace(OverlaySlot::Baseline, named_collection("base", 4));
        sync.replace(OverlaySlot::Modified, named_collection("mod", 2));
        sync.settle().await;

        assert_eq!(sync.layer_count(), 2);
        sync.clear(OverlaySlot::Modified);
        assert_eq!(sync.layer_count(), 1);
        assert!(sync.installed(OverlaySlot::Baseline).is_some());
    }

    #[tokio::test]
    async fn test_view_mode_restyles_baseline() {
        let sync = LayerSynchronizer::new(Arc::new(BuiltinLibraryLoader));
        sync.mount(|| Box::new(GeoJsonSurface::new()));
        sync.replace(OverlaySlot::Baseline, named_collection("base", 1));
        sync.settle().await;
        let before = sync.installed(OverlaySlot::Baseline).unwrap().features[0].style.opacity;

        let restyle = sync.set_view_mode(ViewMode::After).unwrap();
        assert_eq!(restyle.await.unwrap(), InstallOutcome::Installed);
        let after = sync.installed(OverlaySlot::Baseline).unwrap().features[0].style.opacity;

        assert!(after < before);
        assert_eq!(sync.layer_count(), 1);
        assert!(sync.set_view_mode(ViewMode::After).is_none());
    }
}
