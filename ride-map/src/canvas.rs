use std::collections::BTreeMap;

use geo::LineString;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry};
use serde::{Deserialize, Serialize};

use ride_map_model::{Coordinate, IconVariant};

use crate::error::CanvasError;

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ViewId(pub u32);
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct LayerId(pub u32);
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ListenerId(pub u32);

/// Raw viewport interaction events the widget can report.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ViewEventKind {
    DragStart,
    ZoomStart,
    DragEnd,
    ZoomEnd,
}

impl ViewEventKind {
    pub const ALL: [ViewEventKind; 4] = [
        ViewEventKind::DragStart,
        ViewEventKind::ZoomStart,
        ViewEventKind::DragEnd,
        ViewEventKind::ZoomEnd,
    ];
}

/// The native interactive map widget. Everything here is synchronous; the widget lives on the UI
/// thread.
pub trait MapCanvas {
    /// Binds a new view to a DOM-like container. Fails if the container doesn't exist or already
    /// hosts a live view.
    fn create_view(
        &mut self,
        container: &str,
        center: Coordinate,
        zoom: u8,
        max_zoom: u8,
    ) -> Result<ViewId, CanvasError>;
    /// Releases the view and unbinds its container.
    fn remove_view(&mut self, view: ViewId) -> Result<(), CanvasError>;

    fn set_view(&mut self, view: ViewId, center: Coordinate, zoom: u8) -> Result<(), CanvasError>;
    fn center(&self, view: ViewId) -> Result<Coordinate, CanvasError>;
    fn zoom(&self, view: ViewId) -> Result<u8, CanvasError>;

    fn add_tile_layer(&mut self, view: ViewId, url: &str, max_zoom: u8)
        -> Result<LayerId, CanvasError>;
    fn add_marker(
        &mut self,
        view: ViewId,
        label: &str,
        position: Coordinate,
        icon: IconVariant,
    ) -> Result<LayerId, CanvasError>;
    fn update_marker(
        &mut self,
        view: ViewId,
        layer: LayerId,
        position: Coordinate,
        icon: IconVariant,
    ) -> Result<(), CanvasError>;
    fn add_polyline(&mut self, view: ViewId, line: &LineString) -> Result<LayerId, CanvasError>;
    fn remove_layer(&mut self, view: ViewId, layer: LayerId) -> Result<(), CanvasError>;

    fn attach_listener(
        &mut self,
        view: ViewId,
        kind: ViewEventKind,
    ) -> Result<ListenerId, CanvasError>;
    fn detach_listener(&mut self, view: ViewId, listener: ListenerId) -> Result<(), CanvasError>;

    /// Drag, box zoom, touch zoom, double-click zoom and scroll-wheel zoom, all at once.
    fn set_interactive(&mut self, view: ViewId, enabled: bool) -> Result<(), CanvasError>;
}

/// What happened to a `SceneCanvas`, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum CanvasOp {
    CreateView(ViewId),
    RemoveView(ViewId),
    SetView(ViewId, Coordinate),
    AddLayer(LayerId),
    UpdateMarker(LayerId),
    RemoveLayer(LayerId),
    AttachListener(ListenerId),
    DetachListener(ListenerId),
}

#[derive(Clone, Debug)]
struct SceneView {
    container: String,
    center: Coordinate,
    zoom: u8,
    max_zoom: u8,
    interactive: bool,
}

#[derive(Clone, Debug)]
enum LayerKind {
    Tiles {
        url: String,
    },
    Marker {
        label: String,
        position: Coordinate,
        icon: IconVariant,
    },
    Polyline(LineString),
}

#[derive(Clone, Debug)]
struct SceneLayer {
    view: ViewId,
    kind: LayerKind,
}

/// An in-memory map widget. A web-view host mirrors it onto the real widget by rendering
/// `render_geojson`; tests use it to check that nothing leaks.
#[derive(Clone, Debug, Default)]
pub struct SceneCanvas {
    // container -> the view bound to it
    containers: BTreeMap<String, Option<ViewId>>,
    views: BTreeMap<ViewId, SceneView>,
    layers: BTreeMap<LayerId, SceneLayer>,
    listeners: BTreeMap<ListenerId, (ViewId, ViewEventKind)>,
    next_id: u32,
    ops: Vec<CanvasOp>,
}

impl SceneCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(container: &str) -> Self {
        let mut canvas = Self::new();
        canvas.add_container(container);
        canvas
    }

    pub fn add_container(&mut self, container: &str) {
        self.containers.entry(container.to_string()).or_insert(None);
    }

    /// The container went away, like a page unmounting its DOM node.
    pub fn remove_container(&mut self, container: &str) {
        self.containers.remove(container);
    }

    /// Moves the viewport the way a user gesture would. No events are emitted; the host reports
    /// those separately.
    pub fn pan(&mut self, view: ViewId, center: Coordinate) -> Result<(), CanvasError> {
        self.view_mut(view)?.center = center;
        Ok(())
    }

    pub fn is_interactive(&self, view: ViewId) -> bool {
        self.views.get(&view).map(|v| v.interactive).unwrap_or(false)
    }

    pub fn live_views(&self) -> usize {
        self.views.len()
    }

    pub fn live_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn live_listeners(&self) -> usize {
        self.listeners.len()
    }

    /// Labels of every marker currently drawn, sorted.
    pub fn marker_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .layers
            .values()
            .filter_map(|layer| match &layer.kind {
                LayerKind::Marker { label, .. } => Some(label.clone()),
                _ => None,
            })
            .collect();
        labels.sort();
        labels
    }

    pub fn tile_urls(&self) -> Vec<&str> {
        self.layers
            .values()
            .filter_map(|layer| match &layer.kind {
                LayerKind::Tiles { url } => Some(url.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn polylines(&self) -> usize {
        self.layers
            .values()
            .filter(|layer| matches!(layer.kind, LayerKind::Polyline(_)))
            .count()
    }

    pub fn ops(&self) -> &[CanvasOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<CanvasOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn render_geojson(&self, view: ViewId) -> String {
        let mut features = Vec::new();
        for (id, layer) in &self.layers {
            if layer.view != view {
                continue;
            }
            match &layer.kind {
                // The host draws tiles itself
                LayerKind::Tiles { .. } => {}
                LayerKind::Marker {
                    label,
                    position,
                    icon,
                } => {
                    let mut f = Feature::from(Geometry::from(geojson::Value::Point(vec![
                        position.lng,
                        position.lat,
                    ])));
                    f.set_property("type", "marker");
                    f.set_property("id", label.clone());
                    f.set_property("icon", icon.name());
                    if let Some(size) = icon.size() {
                        f.set_property("iconSize", size.to_vec());
                    }
                    if let Some(anchor) = icon.anchor() {
                        f.set_property("iconAnchor", anchor.to_vec());
                    }
                    f.set_property("layer", id.0);
                    features.push(f);
                }
                LayerKind::Polyline(line) => {
                    let mut f = Feature::from(Geometry::from(line));
                    f.set_property("type", "route");
                    f.set_property("layer", id.0);
                    features.push(f);
                }
            }
        }
        GeoJson::from(features.into_iter().collect::<FeatureCollection>()).to_string()
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn view(&self, view: ViewId) -> Result<&SceneView, CanvasError> {
        self.views.get(&view).ok_or(CanvasError::NoSuchView)
    }

    fn view_mut(&mut self, view: ViewId) -> Result<&mut SceneView, CanvasError> {
        self.views.get_mut(&view).ok_or(CanvasError::NoSuchView)
    }

    fn add_layer(&mut self, view: ViewId, kind: LayerKind) -> Result<LayerId, CanvasError> {
        self.view(view)?;
        let id = LayerId(self.next());
        self.layers.insert(id, SceneLayer { view, kind });
        self.ops.push(CanvasOp::AddLayer(id));
        Ok(id)
    }

    fn layer_mut(&mut self, view: ViewId, layer: LayerId) -> Result<&mut SceneLayer, CanvasError> {
        match self.layers.get_mut(&layer) {
            Some(l) if l.view == view => Ok(l),
            _ => Err(CanvasError::NoSuchLayer),
        }
    }
}

impl MapCanvas for SceneCanvas {
    fn create_view(
        &mut self,
        container: &str,
        center: Coordinate,
        zoom: u8,
        max_zoom: u8,
    ) -> Result<ViewId, CanvasError> {
        match self.containers.get(container) {
            None => return Err(CanvasError::NoSuchContainer(container.to_string())),
            Some(Some(_)) => return Err(CanvasError::ContainerBound(container.to_string())),
            Some(None) => {}
        }
        let id = ViewId(self.next());
        self.views.insert(
            id,
            SceneView {
                container: container.to_string(),
                center,
                zoom: zoom.min(max_zoom),
                max_zoom,
                interactive: true,
            },
        );
        self.containers.insert(container.to_string(), Some(id));
        self.ops.push(CanvasOp::CreateView(id));
        Ok(id)
    }

    fn remove_view(&mut self, view: ViewId) -> Result<(), CanvasError> {
        let removed = self.views.remove(&view).ok_or(CanvasError::NoSuchView)?;
        // Like the real widget, removing the view drops whatever was still attached to it
        self.layers.retain(|_, layer| layer.view != view);
        self.listeners.retain(|_, (v, _)| *v != view);
        if let Some(bound) = self.containers.get_mut(&removed.container) {
            *bound = None;
        }
        self.ops.push(CanvasOp::RemoveView(view));
        Ok(())
    }

    fn set_view(&mut self, view: ViewId, center: Coordinate, zoom: u8) -> Result<(), CanvasError> {
        let v = self.view_mut(view)?;
        v.center = center;
        v.zoom = zoom.min(v.max_zoom);
        self.ops.push(CanvasOp::SetView(view, center));
        Ok(())
    }

    fn center(&self, view: ViewId) -> Result<Coordinate, CanvasError> {
        Ok(self.view(view)?.center)
    }

    fn zoom(&self, view: ViewId) -> Result<u8, CanvasError> {
        Ok(self.view(view)?.zoom)
    }

    fn add_tile_layer(
        &mut self,
        view: ViewId,
        url: &str,
        _max_zoom: u8,
    ) -> Result<LayerId, CanvasError> {
        self.add_layer(
            view,
            LayerKind::Tiles {
                url: url.to_string(),
            },
        )
    }

    fn add_marker(
        &mut self,
        view: ViewId,
        label: &str,
        position: Coordinate,
        icon: IconVariant,
    ) -> Result<LayerId, CanvasError> {
        self.add_layer(
            view,
            LayerKind::Marker {
                label: label.to_string(),
                position,
                icon,
            },
        )
    }

    fn update_marker(
        &mut self,
        view: ViewId,
        layer: LayerId,
        new_position: Coordinate,
        new_icon: IconVariant,
    ) -> Result<(), CanvasError> {
        match &mut self.layer_mut(view, layer)?.kind {
            LayerKind::Marker { position, icon, .. } => {
                *position = new_position;
                *icon = new_icon;
            }
            _ => return Err(CanvasError::NoSuchLayer),
        }
        self.ops.push(CanvasOp::UpdateMarker(layer));
        Ok(())
    }

    fn add_polyline(&mut self, view: ViewId, line: &LineString) -> Result<LayerId, CanvasError> {
        self.add_layer(view, LayerKind::Polyline(line.clone()))
    }

    fn remove_layer(&mut self, view: ViewId, layer: LayerId) -> Result<(), CanvasError> {
        self.layer_mut(view, layer)?;
        self.layers.remove(&layer);
        self.ops.push(CanvasOp::RemoveLayer(layer));
        Ok(())
    }

    fn attach_listener(
        &mut self,
        view: ViewId,
        kind: ViewEventKind,
    ) -> Result<ListenerId, CanvasError> {
        self.view(view)?;
        let id = ListenerId(self.next());
        self.listeners.insert(id, (view, kind));
        self.ops.push(CanvasOp::AttachListener(id));
        Ok(id)
    }

    fn detach_listener(&mut self, view: ViewId, listener: ListenerId) -> Result<(), CanvasError> {
        match self.listeners.get(&listener) {
            Some((v, _)) if *v == view => {
                self.listeners.remove(&listener);
                self.ops.push(CanvasOp::DetachListener(listener));
                Ok(())
            }
            _ => Err(CanvasError::NoSuchListener),
        }
    }

    fn set_interactive(&mut self, view: ViewId, enabled: bool) -> Result<(), CanvasError> {
        self.view_mut(view)?.interactive = enabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_binds_once() {
        let mut canvas = SceneCanvas::with_container("map");
        let here = Coordinate::new(41.3, 69.2);
        let view = canvas.create_view("map", here, 16, 20).unwrap();
        assert_eq!(
            canvas.create_view("map", here, 16, 20),
            Err(CanvasError::ContainerBound("map".to_string()))
        );
        assert_eq!(
            canvas.create_view("elsewhere", here, 16, 20),
            Err(CanvasError::NoSuchContainer("elsewhere".to_string()))
        );

        canvas.remove_view(view).unwrap();
        assert!(canvas.create_view("map", here, 16, 20).is_ok());
    }

    #[test]
    fn zoom_is_clamped() {
        let mut canvas = SceneCanvas::with_container("map");
        let view = canvas
            .create_view("map", Coordinate::new(41.3, 69.2), 25, 20)
            .unwrap();
        assert_eq!(canvas.zoom(view).unwrap(), 20);
    }

    #[test]
    fn render_markers_and_route() {
        let mut canvas = SceneCanvas::with_container("map");
        let view = canvas
            .create_view("map", Coordinate::new(41.3, 69.2), 16, 20)
            .unwrap();
        canvas
            .add_marker(
                view,
                "origin-marker-fixed",
                Coordinate::new(41.3, 69.2),
                IconVariant::OriginFixed,
            )
            .unwrap();
        let line = LineString::from(vec![(69.2, 41.3), (69.3, 41.4)]);
        canvas.add_polyline(view, &line).unwrap();

        let gj: serde_json::Value = serde_json::from_str(&canvas.render_geojson(view)).unwrap();
        let features = gj["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["properties"]["id"], "origin-marker-fixed");
        assert_eq!(features[0]["geometry"]["coordinates"][0], 69.2);
        assert_eq!(features[1]["properties"]["type"], "route");
    }
}
