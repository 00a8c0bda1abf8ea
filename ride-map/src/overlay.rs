use geo::LineString;

use ride_map_model::{Coordinate, Endpoint, IconVariant, MarkerId, RouteStatus, RouteSummary};

use crate::canvas::{LayerId, MapCanvas};
use crate::error::{MapError, UpstreamError};
use crate::services::RouteReply;
use crate::session::MapSession;

/// Identifies one route request across the await on the routing service. Only the most recent
/// ticket can complete.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RouteTicket(u64);

/// The drawn route, its price/distance/duration, and the two fixed markers that go with it.
/// These are installed and cleared together.
#[derive(Debug, Default)]
pub struct RouteOverlayController {
    status: RouteStatus,
    layer: Option<LayerId>,
    geometry: Option<LineString>,
    summary: RouteSummary,
    endpoints: Option<(Coordinate, Coordinate)>,
    pending: Option<RouteTicket>,
    next_ticket: u64,
}

impl RouteOverlayController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> RouteStatus {
        self.status
    }

    pub fn summary(&self) -> &RouteSummary {
        &self.summary
    }

    pub fn geometry(&self) -> Option<&LineString> {
        self.geometry.as_ref()
    }

    /// (origin, destination) of the installed route
    pub fn endpoints(&self) -> Option<(Coordinate, Coordinate)> {
        self.endpoints
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Starts a request. An older in-flight request can no longer complete.
    pub fn begin(&mut self) -> RouteTicket {
        self.next_ticket += 1;
        let ticket = RouteTicket(self.next_ticket);
        self.pending = Some(ticket);
        ticket
    }

    pub fn cancel_pending(&mut self) {
        if let Some(ticket) = self.pending.take() {
            log::debug!("Route request {:?} cancelled", ticket);
        }
    }

    /// Applies the routing service's answer. An upstream error leaves the status untouched; the
    /// caller tells the user. If the fixed markers can't be placed, no route is left at all.
    pub fn complete<C: MapCanvas>(
        &mut self,
        canvas: &mut C,
        session: &mut MapSession,
        ticket: RouteTicket,
        origin: Coordinate,
        destination: Coordinate,
        reply: Result<RouteReply, UpstreamError>,
    ) -> Result<RouteStatus, MapError> {
        if self.pending != Some(ticket) {
            return Err(MapError::Cancelled);
        }
        self.pending = None;

        match reply? {
            RouteReply::Found(route) => {
                self.install(
                    canvas,
                    session,
                    origin,
                    destination,
                    route.geometry,
                    route.summary,
                )?;
            }
            RouteReply::NotFound => {
                self.teardown(canvas, session, None);
                self.status = RouteStatus::Unavailable;
            }
        }
        Ok(self.status)
    }

    fn install<C: MapCanvas>(
        &mut self,
        canvas: &mut C,
        session: &mut MapSession,
        origin: Coordinate,
        destination: Coordinate,
        geometry: LineString,
        summary: RouteSummary,
    ) -> Result<(), MapError> {
        let layer = session.add_overlay_layer(canvas, &geometry)?;
        if let Err(err) = place_fixed_markers(canvas, session, origin, destination) {
            // The fixed markers may already have moved, so the old route goes too
            if let Err(err) = session.remove_overlay_layer(canvas, layer) {
                log::debug!("New route layer already gone: {}", err);
            }
            self.teardown(canvas, session, None);
            return Err(err);
        }

        if let Some(old) = self.layer.replace(layer) {
            if let Err(err) = session.remove_overlay_layer(canvas, old) {
                log::debug!("Previous route layer already gone: {}", err);
            }
        }
        self.geometry = Some(geometry);
        self.summary = summary;
        self.endpoints = Some((origin, destination));
        self.status = RouteStatus::Installed;
        log::info!("Installed route from {:?} to {:?}", origin, destination);
        Ok(())
    }

    /// Where a fixed marker click should recentre: the endpoint of the installed route.
    pub fn endpoint(&self, which: Endpoint) -> Option<Coordinate> {
        let (origin, destination) = self.endpoints?;
        Some(match which {
            Endpoint::Origin => origin,
            Endpoint::Destination => destination,
        })
    }

    /// Clears the summary to empty records, removes the polyline, optionally recentres, removes
    /// both fixed markers and resets the status. Every step runs even if an earlier one found
    /// nothing to do, so calling this twice is the same as once.
    pub fn teardown<C: MapCanvas>(
        &mut self,
        canvas: &mut C,
        session: &mut MapSession,
        recenter: Option<(Coordinate, u8)>,
    ) {
        self.summary = RouteSummary::default();
        self.pending = None;

        if let Some(layer) = self.layer.take() {
            if let Err(err) = session.remove_overlay_layer(canvas, layer) {
                log::debug!("Route layer already gone: {}", err);
            }
        }
        self.geometry = None;
        self.endpoints = None;

        if let Some((center, zoom)) = recenter {
            if let Err(err) = session.set_view(canvas, center, zoom) {
                log::debug!("Not recentring after route teardown: {}", err);
            }
        }

        for id in [MarkerId::OriginFixed, MarkerId::DestinationFixed] {
            if session.find_marker(id).is_none() {
                continue;
            }
            if let Err(err) = session.remove_marker(canvas, id) {
                log::debug!("Couldn't remove {}: {}", id.as_str(), err);
            }
        }

        self.status = RouteStatus::NotAttempted;
    }
}

fn place_fixed_markers<C: MapCanvas>(
    canvas: &mut C,
    session: &mut MapSession,
    origin: Coordinate,
    destination: Coordinate,
) -> Result<(), MapError> {
    session.upsert_marker(canvas, MarkerId::OriginFixed, origin, IconVariant::OriginFixed)?;
    session.upsert_marker(
        canvas,
        MarkerId::DestinationFixed,
        destination,
        IconVariant::DestinationFixed,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{ListenerId, SceneCanvas, ViewEventKind, ViewId};
    use crate::error::CanvasError;
    use crate::services::RouteComputation;
    use ride_map_model::{Price, RouteDistance};

    const ORIGIN: Coordinate = Coordinate { lat: 41.3, lng: 69.2 };
    const DESTINATION: Coordinate = Coordinate { lat: 41.4, lng: 69.3 };

    fn setup() -> (SceneCanvas, MapSession) {
        let mut canvas = SceneCanvas::with_container("map");
        let session = MapSession::create(&mut canvas, "map", ORIGIN, 16, 20).unwrap();
        (canvas, session)
    }

    fn found() -> Result<RouteReply, UpstreamError> {
        Ok(RouteReply::Found(RouteComputation {
            geometry: LineString::from(vec![(69.2, 41.3), (69.25, 41.35), (69.3, 41.4)]),
            summary: RouteSummary {
                price: Price {
                    amount: Some(12000.0),
                    currency: Some("UZS".to_string()),
                },
                distance: RouteDistance::from_meters(14_000.0),
                ..Default::default()
            },
        }))
    }

    #[test]
    fn install_then_teardown_twice() {
        let (mut canvas, mut session) = setup();
        let mut overlay = RouteOverlayController::new();
        let ticket = overlay.begin();
        let status = overlay
            .complete(&mut canvas, &mut session, ticket, ORIGIN, DESTINATION, found())
            .unwrap();
        assert_eq!(status, RouteStatus::Installed);
        assert_eq!(
            canvas.marker_labels(),
            vec!["destination-marker-fixed", "origin-marker-fixed"]
        );
        assert_eq!(canvas.polylines(), 1);
        assert_eq!(overlay.endpoint(Endpoint::Destination), Some(DESTINATION));

        overlay.teardown(&mut canvas, &mut session, Some((DESTINATION, 16)));
        let after_once = (
            overlay.status(),
            overlay.summary().clone(),
            canvas.live_layers(),
            session.markers().len(),
        );
        overlay.teardown(&mut canvas, &mut session, Some((DESTINATION, 16)));
        let after_twice = (
            overlay.status(),
            overlay.summary().clone(),
            canvas.live_layers(),
            session.markers().len(),
        );
        assert_eq!(after_once, after_twice);
        assert_eq!(overlay.status(), RouteStatus::NotAttempted);
        assert!(overlay.summary().is_empty());
        assert_eq!(canvas.polylines(), 0);
        assert!(session.find_marker(MarkerId::OriginFixed).is_none());
        assert_eq!(session.current_center(&canvas).unwrap(), DESTINATION);
    }

    #[test]
    fn reinstall_replaces_polyline() {
        let (mut canvas, mut session) = setup();
        let mut overlay = RouteOverlayController::new();
        for _ in 0..3 {
            let ticket = overlay.begin();
            overlay
                .complete(&mut canvas, &mut session, ticket, ORIGIN, DESTINATION, found())
                .unwrap();
        }
        assert_eq!(canvas.polylines(), 1);
        assert_eq!(session.markers().len(), 2);
    }

    #[test]
    fn upstream_error_keeps_status() {
        let (mut canvas, mut session) = setup();
        let mut overlay = RouteOverlayController::new();
        let ticket = overlay.begin();
        let result = overlay.complete(
            &mut canvas,
            &mut session,
            ticket,
            ORIGIN,
            DESTINATION,
            Err(UpstreamError::new("routing is down")),
        );
        assert!(matches!(result, Err(MapError::UpstreamFailure(_))));
        assert_eq!(overlay.status(), RouteStatus::NotAttempted);
        assert_eq!(canvas.live_layers(), 0);

        let ticket = overlay.begin();
        overlay
            .complete(&mut canvas, &mut session, ticket, ORIGIN, DESTINATION, found())
            .unwrap();
        let ticket = overlay.begin();
        let _ = overlay.complete(
            &mut canvas,
            &mut session,
            ticket,
            ORIGIN,
            DESTINATION,
            Err(UpstreamError::new("routing is down")),
        );
        // The previous route survives a failed refresh
        assert_eq!(overlay.status(), RouteStatus::Installed);
        assert_eq!(canvas.polylines(), 1);
    }

    #[test]
    fn not_found_is_an_explicit_outcome() {
        let (mut canvas, mut session) = setup();
        let mut overlay = RouteOverlayController::new();
        let ticket = overlay.begin();
        let status = overlay
            .complete(
                &mut canvas,
                &mut session,
                ticket,
                ORIGIN,
                DESTINATION,
                Ok(RouteReply::NotFound),
            )
            .unwrap();
        assert_eq!(status, RouteStatus::Unavailable);
        assert_eq!(canvas.live_layers(), 0);
    }

    #[test]
    fn superseded_and_cancelled_tickets() {
        let (mut canvas, mut session) = setup();
        let mut overlay = RouteOverlayController::new();
        let old = overlay.begin();
        let new = overlay.begin();
        assert!(matches!(
            overlay.complete(&mut canvas, &mut session, old, ORIGIN, DESTINATION, found()),
            Err(MapError::Cancelled)
        ));

        overlay.cancel_pending();
        assert!(matches!(
            overlay.complete(&mut canvas, &mut session, new, ORIGIN, DESTINATION, found()),
            Err(MapError::Cancelled)
        ));
        assert_eq!(overlay.status(), RouteStatus::NotAttempted);
        assert_eq!(canvas.live_layers(), 0);
    }

    #[test]
    fn destroyed_session_is_stale() {
        let (mut canvas, mut session) = setup();
        session.destroy(&mut canvas);
        let mut overlay = RouteOverlayController::new();
        let ticket = overlay.begin();
        assert!(matches!(
            overlay.complete(&mut canvas, &mut session, ticket, ORIGIN, DESTINATION, found()),
            Err(MapError::StaleReference(_))
        ));
        assert_eq!(overlay.status(), RouteStatus::NotAttempted);
        // Teardown on a dead session still resets state
        overlay.teardown(&mut canvas, &mut session, Some((DESTINATION, 16)));
        assert_eq!(overlay.status(), RouteStatus::NotAttempted);
    }

    #[test]
    fn failed_marker_update_drops_the_whole_route() {
        let (scene, mut session) = setup();
        let mut canvas = FlakyCanvas {
            inner: scene,
            fail_updates: false,
        };
        let mut overlay = RouteOverlayController::new();
        let ticket = overlay.begin();
        overlay
            .complete(&mut canvas, &mut session, ticket, ORIGIN, DESTINATION, found())
            .unwrap();
        assert_eq!(canvas.inner.polylines(), 1);

        canvas.fail_updates = true;
        let ticket = overlay.begin();
        let result =
            overlay.complete(&mut canvas, &mut session, ticket, ORIGIN, DESTINATION, found());
        assert!(matches!(result, Err(MapError::StaleReference(_))));
        assert_eq!(overlay.status(), RouteStatus::NotAttempted);
        assert!(overlay.summary().is_empty());
        assert!(overlay.geometry().is_none());
        assert_eq!(overlay.endpoint(Endpoint::Origin), None);
        assert_eq!(canvas.inner.polylines(), 0);
        assert!(session.find_marker(MarkerId::OriginFixed).is_none());
        assert!(session.find_marker(MarkerId::DestinationFixed).is_none());
        assert!(canvas.inner.marker_labels().is_empty());
    }

    // A scene whose marker updates can be made to fail
    struct FlakyCanvas {
        inner: SceneCanvas,
        fail_updates: bool,
    }

    impl MapCanvas for FlakyCanvas {
        fn create_view(
            &mut self,
            container: &str,
            center: Coordinate,
            zoom: u8,
            max_zoom: u8,
        ) -> Result<ViewId, CanvasError> {
            self.inner.create_view(container, center, zoom, max_zoom)
        }
        fn remove_view(&mut self, view: ViewId) -> Result<(), CanvasError> {
            self.inner.remove_view(view)
        }
        fn set_view(
            &mut self,
            view: ViewId,
            center: Coordinate,
            zoom: u8,
        ) -> Result<(), CanvasError> {
            self.inner.set_view(view, center, zoom)
        }
        fn center(&self, view: ViewId) -> Result<Coordinate, CanvasError> {
            self.inner.center(view)
        }
        fn zoom(&self, view: ViewId) -> Result<u8, CanvasError> {
            self.inner.zoom(view)
        }
        fn add_tile_layer(
            &mut self,
            view: ViewId,
            url: &str,
            max_zoom: u8,
        ) -> Result<LayerId, CanvasError> {
            self.inner.add_tile_layer(view, url, max_zoom)
        }
        fn add_marker(
            &mut self,
            view: ViewId,
            label: &str,
            position: Coordinate,
            icon: IconVariant,
        ) -> Result<LayerId, CanvasError> {
            self.inner.add_marker(view, label, position, icon)
        }
        fn update_marker(
            &mut self,
            view: ViewId,
            layer: LayerId,
            position: Coordinate,
            icon: IconVariant,
        ) -> Result<(), CanvasError> {
            if self.fail_updates {
                return Err(CanvasError::NoSuchLayer);
            }
            self.inner.update_marker(view, layer, position, icon)
        }
        fn add_polyline(
            &mut self,
            view: ViewId,
            line: &LineString,
        ) -> Result<LayerId, CanvasError> {
            self.inner.add_polyline(view, line)
        }
        fn remove_layer(&mut self, view: ViewId, layer: LayerId) -> Result<(), CanvasError> {
            self.inner.remove_layer(view, layer)
        }
        fn attach_listener(
            &mut self,
            view: ViewId,
            kind: ViewEventKind,
        ) -> Result<ListenerId, CanvasError> {
            self.inner.attach_listener(view, kind)
        }
        fn detach_listener(
            &mut self,
            view: ViewId,
            listener: ListenerId,
        ) -> Result<(), CanvasError> {
            self.inner.detach_listener(view, listener)
        }
        fn set_interactive(&mut self, view: ViewId, enabled: bool) -> Result<(), CanvasError> {
            self.inner.set_interactive(view, enabled)
        }
    }
}
