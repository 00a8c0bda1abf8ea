use std::collections::BTreeMap;

use ride_map_model::{Coordinate, IconVariant, MarkerId};

use crate::canvas::{LayerId, MapCanvas, ViewId};
use crate::error::MapError;

#[derive(Clone, Debug, PartialEq)]
pub struct MarkerHandle {
    pub id: MarkerId,
    pub position: Coordinate,
    pub icon: IconVariant,
    // None while detached from the view
    layer: Option<LayerId>,
}

impl MarkerHandle {
    pub fn is_attached(&self) -> bool {
        self.layer.is_some()
    }
}

/// Markers keyed by their semantic identity. Keying by `MarkerId` means two live handles for the
/// same id can't exist.
#[derive(Debug, Default)]
pub struct MarkerRegistry {
    markers: BTreeMap<MarkerId, MarkerHandle>,
}

impl MarkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves and restyles an existing marker in place, attaching it again if it was hidden.
    /// Otherwise creates it. The canvas is updated before the registry, so a canvas failure
    /// leaves the registry as it was.
    pub fn upsert<C: MapCanvas>(
        &mut self,
        canvas: &mut C,
        view: ViewId,
        id: MarkerId,
        position: Coordinate,
        icon: IconVariant,
    ) -> Result<&MarkerHandle, MapError> {
        let existing_layer = self.markers.get(&id).and_then(|m| m.layer);
        let layer = match existing_layer {
            Some(layer) => {
                canvas.update_marker(view, layer, position, icon)?;
                layer
            }
            None => canvas.add_marker(view, id.as_str(), position, icon)?,
        };

        let handle = self.markers.entry(id).or_insert(MarkerHandle {
            id,
            position,
            icon,
            layer: None,
        });
        handle.position = position;
        handle.icon = icon;
        handle.layer = Some(layer);
        Ok(handle)
    }

    pub fn find(&self, id: MarkerId) -> Option<&MarkerHandle> {
        self.markers.get(&id)
    }

    /// Takes the marker off the view but remembers it, so the next `upsert` brings it back.
    pub fn detach<C: MapCanvas>(
        &mut self,
        canvas: &mut C,
        view: ViewId,
        id: MarkerId,
    ) -> Result<(), MapError> {
        if let Some(handle) = self.markers.get_mut(&id) {
            if let Some(layer) = handle.layer.take() {
                canvas.remove_layer(view, layer)?;
            }
        }
        Ok(())
    }

    /// No-op if the marker isn't registered.
    pub fn remove<C: MapCanvas>(
        &mut self,
        canvas: &mut C,
        view: ViewId,
        id: MarkerId,
    ) -> Result<(), MapError> {
        if let Some(handle) = self.markers.remove(&id) {
            if let Some(layer) = handle.layer {
                canvas.remove_layer(view, layer)?;
            }
        }
        Ok(())
    }

    /// Drops every marker. Keeps going past canvas failures so the registry always ends up empty.
    pub fn clear<C: MapCanvas>(&mut self, canvas: &mut C, view: ViewId) {
        for (id, handle) in std::mem::take(&mut self.markers) {
            if let Some(layer) = handle.layer {
                if let Err(err) = canvas.remove_layer(view, layer) {
                    log::debug!("marker {} already gone: {}", id.as_str(), err);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarkerHandle> {
        self.markers.values()
    }
}
