use std::collections::{BTreeMap, BTreeSet};

use geo::LineString;

use ride_map_model::{Coordinate, IconVariant, MarkerId};

use crate::canvas::{LayerId, ListenerId, MapCanvas, ViewEventKind, ViewId};
use crate::error::MapError;
use crate::markers::{MarkerHandle, MarkerRegistry};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ViewHandle {
    Live(ViewId),
    /// Never created, or destroyed. Nothing may be done through it.
    Invalid,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TileSource {
    pub url: String,
    pub max_zoom: u8,
}

/// The one map view shared by every page, plus everything attached to it. Dropping a
/// `MapSession` without `destroy` leaks the widget's view, so the owner always destroys.
#[derive(Debug)]
pub struct MapSession {
    handle: ViewHandle,
    container: String,
    center: Coordinate,
    zoom: u8,
    loaded: bool,
    interactive: bool,
    base_layer: Option<LayerId>,
    // Route polylines and anything else drawn on top
    overlays: BTreeSet<LayerId>,
    listeners: BTreeMap<ViewEventKind, ListenerId>,
    markers: MarkerRegistry,
}

impl MapSession {
    /// A session that was never created. `destroy` on it does nothing.
    pub fn detached() -> Self {
        Self {
            handle: ViewHandle::Invalid,
            container: String::new(),
            center: Coordinate::default(),
            zoom: 0,
            loaded: false,
            interactive: false,
            base_layer: None,
            overlays: BTreeSet::new(),
            listeners: BTreeMap::new(),
            markers: MarkerRegistry::new(),
        }
    }

    pub fn create<C: MapCanvas>(
        canvas: &mut C,
        container: &str,
        center: Coordinate,
        zoom: u8,
        max_zoom: u8,
    ) -> Result<Self, MapError> {
        let view = canvas.create_view(container, center, zoom, max_zoom)?;
        log::info!("Created map view {:?} in container {}", view, container);
        Ok(Self {
            handle: ViewHandle::Live(view),
            container: container.to_string(),
            center,
            zoom,
            interactive: true,
            ..Self::detached()
        })
    }

    pub fn handle(&self) -> ViewHandle {
        self.handle
    }

    pub fn is_live(&self) -> bool {
        matches!(self.handle, ViewHandle::Live(_))
    }

    pub fn view(&self) -> Result<ViewId, MapError> {
        match self.handle {
            ViewHandle::Live(view) => Ok(view),
            ViewHandle::Invalid => Err(MapError::StaleReference("map session was destroyed")),
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Where the session last put the view. The user may have moved it since; see
    /// `current_center`.
    pub fn center(&self) -> Coordinate {
        self.center
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn loaded(&self) -> bool {
        self.loaded
    }

    pub fn interactive(&self) -> bool {
        self.interactive
    }

    /// Asks the widget, which knows about gestures the session never saw.
    pub fn current_center<C: MapCanvas>(&self, canvas: &C) -> Result<Coordinate, MapError> {
        Ok(canvas.center(self.view()?)?)
    }

    pub fn set_view<C: MapCanvas>(
        &mut self,
        canvas: &mut C,
        center: Coordinate,
        zoom: u8,
    ) -> Result<(), MapError> {
        canvas.set_view(self.view()?, center, zoom)?;
        self.center = center;
        self.zoom = zoom;
        Ok(())
    }

    /// Adds the background tiles once. Later calls return the existing layer.
    pub fn attach_base_layer<C: MapCanvas>(
        &mut self,
        canvas: &mut C,
        source: &TileSource,
    ) -> Result<LayerId, MapError> {
        let view = self.view()?;
        if let Some(layer) = self.base_layer {
            return Ok(layer);
        }
        let layer = canvas.add_tile_layer(view, &source.url, source.max_zoom)?;
        self.base_layer = Some(layer);
        Ok(layer)
    }

    /// The tile layer finished loading. True only the first time for this session.
    pub fn mark_tiles_loaded(&mut self) -> bool {
        if self.loaded || self.base_layer.is_none() || !self.is_live() {
            return false;
        }
        self.loaded = true;
        true
    }

    /// Subscribes to the four drag/zoom events. Already-attached listeners are left alone.
    pub fn wire_interaction_events<C: MapCanvas>(&mut self, canvas: &mut C) -> Result<(), MapError> {
        let view = self.view()?;
        for kind in ViewEventKind::ALL {
            if self.listeners.contains_key(&kind) {
                continue;
            }
            let id = canvas.attach_listener(view, kind)?;
            self.listeners.insert(kind, id);
        }
        Ok(())
    }

    pub fn listens_to(&self, kind: ViewEventKind) -> bool {
        self.is_live() && self.listeners.contains_key(&kind)
    }

    pub fn set_interactive<C: MapCanvas>(
        &mut self,
        canvas: &mut C,
        enabled: bool,
    ) -> Result<(), MapError> {
        canvas.set_interactive(self.view()?, enabled)?;
        self.interactive = enabled;
        Ok(())
    }

    pub fn add_overlay_layer<C: MapCanvas>(
        &mut self,
        canvas: &mut C,
        line: &LineString,
    ) -> Result<LayerId, MapError> {
        let layer = canvas.add_polyline(self.view()?, line)?;
        self.overlays.insert(layer);
        Ok(layer)
    }

    /// No-op for layers this session doesn't own (already removed, or from a destroyed view).
    pub fn remove_overlay_layer<C: MapCanvas>(
        &mut self,
        canvas: &mut C,
        layer: LayerId,
    ) -> Result<(), MapError> {
        if !self.overlays.remove(&layer) {
            return Ok(());
        }
        canvas.remove_layer(self.view()?, layer)?;
        Ok(())
    }

    pub fn upsert_marker<C: MapCanvas>(
        &mut self,
        canvas: &mut C,
        id: MarkerId,
        position: Coordinate,
        icon: IconVariant,
    ) -> Result<&MarkerHandle, MapError> {
        let view = self.view()?;
        self.markers.upsert(canvas, view, id, position, icon)
    }

    pub fn find_marker(&self, id: MarkerId) -> Option<&MarkerHandle> {
        self.markers.find(id)
    }

    pub fn detach_marker<C: MapCanvas>(&mut self, canvas: &mut C, id: MarkerId) -> Result<(), MapError> {
        let view = self.view()?;
        self.markers.detach(canvas, view, id)
    }

    pub fn remove_marker<C: MapCanvas>(&mut self, canvas: &mut C, id: MarkerId) -> Result<(), MapError> {
        let view = self.view()?;
        self.markers.remove(canvas, view, id)
    }

    pub fn markers(&self) -> &MarkerRegistry {
        &self.markers
    }

    /// Releases listeners, markers, overlays and the base layer, then the view itself. Safe to
    /// call on a destroyed or never-created session.
    pub fn destroy<C: MapCanvas>(&mut self, canvas: &mut C) {
        let view = match self.handle {
            ViewHandle::Live(view) => view,
            ViewHandle::Invalid => {
                self.markers = MarkerRegistry::new();
                return;
            }
        };

        for (kind, listener) in std::mem::take(&mut self.listeners) {
            if let Err(err) = canvas.detach_listener(view, listener) {
                log::debug!("{:?} listener already detached: {}", kind, err);
            }
        }
        self.markers.clear(canvas, view);
        let layers = std::mem::take(&mut self.overlays)
            .into_iter()
            .chain(self.base_layer.take());
        for layer in layers {
            if let Err(err) = canvas.remove_layer(view, layer) {
                log::debug!("layer {:?} already removed: {}", layer, err);
            }
        }
        if let Err(err) = canvas.remove_view(view) {
            log::warn!("Removing map view {:?} failed: {}", view, err);
        }

        self.handle = ViewHandle::Invalid;
        self.loaded = false;
        log::info!("Destroyed map view {:?}", view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::SceneCanvas;

    fn tiles() -> TileSource {
        TileSource {
            url: "https://tiles.example/{z}/{x}/{y}.png".to_string(),
            max_zoom: 20,
        }
    }

    fn live_session(canvas: &mut SceneCanvas) -> MapSession {
        MapSession::create(canvas, "map", Coordinate::new(41.3, 69.2), 16, 20).unwrap()
    }

    #[test]
    fn create_fails_on_bound_container() {
        let mut canvas = SceneCanvas::with_container("map");
        let _first = live_session(&mut canvas);
        let second = MapSession::create(&mut canvas, "map", Coordinate::new(41.3, 69.2), 16, 20);
        assert!(matches!(second, Err(MapError::ResourceUnavailable(_))));
    }

    #[test]
    fn base_layer_and_loaded_signal_happen_once() {
        let mut canvas = SceneCanvas::with_container("map");
        let mut session = live_session(&mut canvas);

        // Tiles can't finish loading before they exist
        assert!(!session.mark_tiles_loaded());

        let first = session.attach_base_layer(&mut canvas, &tiles()).unwrap();
        let second = session.attach_base_layer(&mut canvas, &tiles()).unwrap();
        assert_eq!(first, second);
        assert_eq!(canvas.tile_urls(), vec!["https://tiles.example/{z}/{x}/{y}.png"]);

        assert!(session.mark_tiles_loaded());
        assert!(!session.mark_tiles_loaded());
        assert!(session.loaded());
    }

    #[test]
    fn set_view_keeps_markers() {
        let mut canvas = SceneCanvas::with_container("map");
        let mut session = live_session(&mut canvas);
        session
            .upsert_marker(
                &mut canvas,
                MarkerId::RealLocation,
                Coordinate::new(41.3, 69.2),
                IconVariant::RealLocation,
            )
            .unwrap();
        let before = canvas.live_layers();

        let there = Coordinate::new(41.35, 69.25);
        session.set_view(&mut canvas, there, 15).unwrap();
        session.set_view(&mut canvas, there, 15).unwrap();
        assert_eq!(canvas.live_layers(), before);
        assert_eq!(session.current_center(&canvas).unwrap(), there);
        assert_eq!(session.zoom(), 15);
    }

    #[test]
    fn destroy_releases_everything() {
        let mut canvas = SceneCanvas::with_container("map");
        let mut session = live_session(&mut canvas);
        session.attach_base_layer(&mut canvas, &tiles()).unwrap();
        session.wire_interaction_events(&mut canvas).unwrap();
        session.wire_interaction_events(&mut canvas).unwrap();
        assert_eq!(canvas.live_listeners(), 4);
        session
            .upsert_marker(
                &mut canvas,
                MarkerId::OriginFixed,
                Coordinate::new(41.3, 69.2),
                IconVariant::OriginFixed,
            )
            .unwrap();
        let line = LineString::from(vec![(69.2, 41.3), (69.3, 41.4)]);
        session.add_overlay_layer(&mut canvas, &line).unwrap();

        session.destroy(&mut canvas);
        assert!(!session.is_live());
        assert!(session.markers().is_empty());
        assert!(!session.listens_to(ViewEventKind::DragEnd));
        assert_eq!(canvas.live_listeners(), 0);
        assert_eq!(canvas.live_layers(), 0);
        assert_eq!(canvas.live_views(), 0);

        // Again, harmlessly
        session.destroy(&mut canvas);
        assert!(matches!(
            session.set_view(&mut canvas, Coordinate::new(41.3, 69.2), 16),
            Err(MapError::StaleReference(_))
        ));

        // The container is free again
        assert!(MapSession::create(&mut canvas, "map", Coordinate::new(41.3, 69.2), 16, 20).is_ok());
    }

    #[test]
    fn destroy_never_created() {
        let mut canvas = SceneCanvas::new();
        let mut session = MapSession::detached();
        session.destroy(&mut canvas);
        assert!(session.markers().is_empty());
        assert_eq!(session.handle(), ViewHandle::Invalid);
        assert!(canvas.ops().is_empty());
    }

    #[test]
    fn interactions_toggle() {
        let mut canvas = SceneCanvas::with_container("map");
        let mut session = live_session(&mut canvas);
        let view = session.view().unwrap();
        session.set_interactive(&mut canvas, false).unwrap();
        assert!(!canvas.is_interactive(view));
        session.set_interactive(&mut canvas, true).unwrap();
        assert!(canvas.is_interactive(view));
    }
}
