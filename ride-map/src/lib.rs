//! Keeps one interactive map consistent while a rider moves between the origin, destination and
//! ride confirmation pages. The map widget itself sits behind [`MapCanvas`]; the host forwards
//! its events here and carries out the queued [`Effect`]s.

use std::time::Duration;

use ride_map_model::{
    Coordinate, Endpoint, IconVariant, MarkerId, Notification, PageContext, RouteStatus, Severity,
    UpdateKind,
};

pub use crate::canvas::{
    CanvasOp, LayerId, ListenerId, MapCanvas, SceneCanvas, ViewEventKind, ViewId,
};
pub use crate::config::MapConfig;
pub use crate::error::{CanvasError, MapError, UpstreamError};
pub use crate::gate::{GateState, InteractionGate, InteractionKind, SearchFlag, SettleVerdict};
pub use crate::markers::{MarkerHandle, MarkerRegistry};
pub use crate::overlay::{RouteOverlayController, RouteTicket};
pub use crate::services::{
    Geocoder, KeyValueStore, LocationProvider, MemoryStore, Navigator, Notifier, RequestContext,
    RouteComputation, RouteReply, RoutingService,
};
pub use crate::session::{MapSession, TileSource, ViewHandle};
pub use crate::shared::{
    compute_route, follow_location, load_map_with_location, resolve_address, search_place,
    SharedRideMap,
};
pub use crate::stores::CoordinateStore;

mod canvas;
mod config;
mod error;
mod gate;
mod markers;
mod overlay;
mod services;
mod session;
mod shared;
mod stores;

/// Something the host has to do on the engine's behalf, in the order queued.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Navigate(PageContext),
    Notify(Notification),
}

/// Identifies a search across its await. Stale once the page changes or a newer search starts.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SearchToken {
    epoch: u64,
    id: u64,
}

pub struct RideMap<C: MapCanvas> {
    config: MapConfig,
    canvas: C,
    session: MapSession,
    gate: InteractionGate,
    overlay: RouteOverlayController,
    origin: CoordinateStore,
    destination: CoordinateStore,
    real_location: Option<Coordinate>,
    page: PageContext,
    // Bumped on every page change; async continuations compare against it
    epoch: u64,
    markers_visible: bool,
    loading: bool,
    pending_search: Option<SearchToken>,
    next_search: u64,
    outbox: Vec<Effect>,
}

impl<C: MapCanvas> RideMap<C> {
    pub fn new(canvas: C, config: MapConfig, page: PageContext) -> Self {
        let gate = InteractionGate::new(
            page.clone(),
            Duration::from_millis(config.drag_settle_ms),
            Duration::from_millis(config.zoom_settle_ms),
        );
        Self {
            config,
            canvas,
            session: MapSession::detached(),
            gate,
            overlay: RouteOverlayController::new(),
            origin: CoordinateStore::new(),
            destination: CoordinateStore::new(),
            real_location: None,
            page,
            epoch: 0,
            markers_visible: true,
            loading: false,
            pending_search: None,
            next_search: 0,
            outbox: Vec::new(),
        }
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Applies to the next settle timer and the next `load_map`.
    pub fn set_config(&mut self, config: MapConfig) {
        self.gate.set_delays(
            Duration::from_millis(config.drag_settle_ms),
            Duration::from_millis(config.zoom_settle_ms),
        );
        self.config = config;
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    /// For the host to mirror user gestures onto the widget.
    pub fn canvas_mut(&mut self) -> &mut C {
        &mut self.canvas
    }

    pub fn session(&self) -> &MapSession {
        &self.session
    }

    pub fn gate(&self) -> &InteractionGate {
        &self.gate
    }

    pub fn overlay(&self) -> &RouteOverlayController {
        &self.overlay
    }

    pub fn store(&self, endpoint: Endpoint) -> &CoordinateStore {
        match endpoint {
            Endpoint::Origin => &self.origin,
            Endpoint::Destination => &self.destination,
        }
    }

    fn store_mut(&mut self, endpoint: Endpoint) -> &mut CoordinateStore {
        match endpoint {
            Endpoint::Origin => &mut self.origin,
            Endpoint::Destination => &mut self.destination,
        }
    }

    pub fn real_location(&self) -> Option<Coordinate> {
        self.real_location
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn has_map(&self) -> bool {
        self.session.is_live()
    }

    pub fn markers_visible(&self) -> bool {
        self.markers_visible
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// The draft pin bobs while the position or a route is loading, or the map is moving under it.
    pub fn is_marker_animating(&self) -> bool {
        self.loading || self.overlay.is_pending() || self.gate.is_user_dragging()
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.outbox)
    }

    /// Hands queued effects to the collaborators, in order.
    pub fn flush<N: Navigator, T: Notifier>(&mut self, navigator: &mut N, notifier: &mut T) {
        for effect in self.take_effects() {
            match effect {
                Effect::Navigate(page) => navigator.navigate(page.path()),
                Effect::Notify(notification) => notifier.notify(&notification),
            }
        }
    }

    /// The router moved to another page. Anything still pending belongs to the old one.
    pub fn enter_page(&mut self, page: PageContext) {
        self.epoch += 1;
        self.gate.reset(page.clone());
        self.overlay.cancel_pending();
        self.pending_search = None;
        log::debug!("Entering {} (epoch {})", page.path(), self.epoch);
        self.page = page;
        self.sync_draft_markers();
    }

    /// Puts the shared map into `container` for the current page. Reuses the live view when it's
    /// already there, otherwise replaces it. If the map can't be created, the page carries on
    /// without one.
    pub fn load_map(&mut self, container: &str) -> bool {
        let result = self.try_load_map(container);
        self.absorb(result).is_some()
    }

    fn try_load_map(&mut self, container: &str) -> Result<(), MapError> {
        let center = self
            .initial_center()
            .ok_or_else(|| MapError::ResourceUnavailable("no position known yet".to_string()))?;
        let zoom = self.config.default_zoom;
        let confirming = self.page == PageContext::ConfirmRide;

        if self.session.is_live() && self.session.container() == container {
            if !confirming {
                self.session.set_view(&mut self.canvas, center, zoom)?;
            }
        } else {
            self.destroy_map();
            self.session = MapSession::create(
                &mut self.canvas,
                container,
                center,
                zoom,
                self.config.max_zoom,
            )?;
        }
        if !confirming {
            self.markers_visible = true;
        }

        let tiles = TileSource {
            url: self.config.tile_url.clone(),
            max_zoom: self.config.max_zoom,
        };
        self.session.attach_base_layer(&mut self.canvas, &tiles)?;
        self.session.wire_interaction_events(&mut self.canvas)?;
        if let Some(here) = self.real_location {
            self.session.upsert_marker(
                &mut self.canvas,
                MarkerId::RealLocation,
                here,
                IconVariant::RealLocation,
            )?;
        }
        self.sync_draft_markers();
        Ok(())
    }

    fn initial_center(&self) -> Option<Coordinate> {
        let origin = self.origin.coords().or(self.real_location);
        match self.page {
            PageContext::SetDestination => self
                .destination
                .coords()
                .filter(|c| c.is_set())
                .or(origin),
            _ => origin,
        }
    }

    /// True the first time the base tiles finish loading.
    pub fn on_tiles_loaded(&mut self) -> bool {
        self.session.mark_tiles_loaded()
    }

    pub fn on_drag_start(&mut self) {
        self.interaction_started(InteractionKind::Drag, ViewEventKind::DragStart);
    }

    pub fn on_zoom_start(&mut self) {
        self.interaction_started(InteractionKind::Zoom, ViewEventKind::ZoomStart);
    }

    /// `now` is the time since the host started.
    pub fn on_drag_end(&mut self, now: Duration) {
        self.interaction_ended(InteractionKind::Drag, ViewEventKind::DragEnd, now);
    }

    pub fn on_zoom_end(&mut self, now: Duration) {
        self.interaction_ended(InteractionKind::Zoom, ViewEventKind::ZoomEnd, now);
    }

    fn interaction_started(&mut self, kind: InteractionKind, event: ViewEventKind) {
        if !self.session.listens_to(event) {
            return;
        }
        self.gate.begin(kind);
        if self.gate.is_user_dragging() {
            self.sync_draft_markers();
        }
    }

    fn interaction_ended(&mut self, kind: InteractionKind, event: ViewEventKind, now: Duration) {
        if !self.session.listens_to(event) {
            return;
        }
        self.gate.end(kind, now);
        self.sync_draft_markers();
        self.tick(now);
    }

    /// Runs a settle whose quiet window has passed. The host calls this from its timer.
    pub fn tick(&mut self, now: Duration) {
        let Some(verdict) = self.gate.poll(now, self.overlay.status()) else {
            return;
        };
        if let SettleVerdict::Commit(endpoint) = verdict {
            let result = self.session.current_center(&self.canvas);
            if let Some(center) = self.absorb(result) {
                self.store_mut(endpoint).change(center, UpdateKind::Provisional);
            }
        }
        self.sync_draft_markers();
    }

    /// A new GPS fix. The first one also becomes the origin.
    pub fn on_location_update(&mut self, here: Coordinate) {
        self.real_location = Some(here);
        if self.origin.coords().is_none() {
            self.origin.change(here, UpdateKind::Final);
        }
        if self.session.is_live() {
            let result = self
                .session
                .upsert_marker(
                    &mut self.canvas,
                    MarkerId::RealLocation,
                    here,
                    IconVariant::RealLocation,
                )
                .map(|_| ());
            self.absorb(result);
        }
    }

    pub fn on_marker_click(&mut self, id: MarkerId) {
        if let Some(endpoint) = id.fixed_endpoint() {
            self.click_fixed_marker(endpoint);
        }
    }

    /// Tears the route down, recentres on the clicked marker, shows the draft markers again and
    /// only then navigates, so the edit page never sees the old overlay.
    pub fn click_fixed_marker(&mut self, which: Endpoint) {
        let Some(position) = self
            .session
            .find_marker(MarkerId::fixed(which))
            .map(|m| m.position)
        else {
            log::debug!("{:?} fixed marker clicked, but it's gone", which);
            return;
        };

        self.teardown_route(which == Endpoint::Destination);
        let result = self
            .session
            .set_view(&mut self.canvas, position, self.config.default_zoom);
        self.absorb(result);
        self.markers_visible = true;

        let page = PageContext::edit_page(which);
        self.outbox.push(Effect::Navigate(page.clone()));
        self.enter_page(page);
    }

    pub fn teardown_route(&mut self, recenter_on_destination: bool) {
        let recenter = if recenter_on_destination {
            self.destination
                .coords()
                .map(|c| (c, self.config.default_zoom))
        } else {
            None
        };
        self.overlay
            .teardown(&mut self.canvas, &mut self.session, recenter);
        self.markers_visible = true;
        self.sync_draft_markers();
    }

    /// Starts a route request between the current origin and destination. None if either is
    /// unknown.
    pub fn begin_route(&mut self) -> Option<(RouteTicket, Coordinate, Coordinate)> {
        let origin = self.origin.coords()?;
        let destination = self.destination.coords()?;
        Some((self.overlay.begin(), origin, destination))
    }

    /// Applies a routing answer. A stale ticket is dropped silently; failures are reported to the
    /// user and leave the current overlay alone.
    pub fn finish_route(
        &mut self,
        ticket: RouteTicket,
        origin: Coordinate,
        destination: Coordinate,
        reply: Result<RouteReply, UpstreamError>,
    ) -> RouteStatus {
        let result = self.overlay.complete(
            &mut self.canvas,
            &mut self.session,
            ticket,
            origin,
            destination,
            reply,
        );
        match self.absorb(result) {
            Some(RouteStatus::Installed) => {
                self.markers_visible = false;
                self.sync_draft_markers();
            }
            Some(RouteStatus::Unavailable) => {
                self.notify("No route between these points", Severity::Warning);
            }
            _ => {}
        }
        self.overlay.status()
    }

    pub fn begin_search(&mut self) -> SearchToken {
        self.next_search += 1;
        let token = SearchToken {
            epoch: self.epoch,
            id: self.next_search,
        };
        self.pending_search = Some(token);
        token
    }

    pub fn is_current_search(&self, token: SearchToken) -> bool {
        self.pending_search == Some(token) && token.epoch == self.epoch
    }

    /// Moves the map to a search result and records it as the page's chosen point. The settle
    /// triggered by this programmatic move is suppressed until the user touches the map.
    pub fn apply_search_result(&mut self, at: Coordinate) {
        self.pending_search = None;
        let Some(endpoint) = self.page.editing() else {
            log::debug!("Search result on {} has nowhere to go", self.page.path());
            return;
        };
        self.gate.start_search();
        self.store_mut(endpoint).change(at, UpdateKind::Final);
        if self.session.is_live() {
            let zoom = self.session.zoom();
            let result = self.session.set_view(&mut self.canvas, at, zoom);
            self.absorb(result);
        }
        self.sync_draft_markers();
    }

    pub fn set_interactions_enabled(&mut self, enabled: bool) {
        let result = self.session.set_interactive(&mut self.canvas, enabled);
        if self.absorb(result).is_none() {
            log::debug!("Interactions not toggled; no map");
        }
    }

    /// Releases the map entirely. The route goes with it. Safe when there's no map.
    pub fn destroy_map(&mut self) {
        self.overlay
            .teardown(&mut self.canvas, &mut self.session, None);
        self.session.destroy(&mut self.canvas);
        self.gate.reset(self.page.clone());
    }

    /// Shows the current page's draft marker at its store's coordinate and hides the other one.
    fn sync_draft_markers(&mut self) {
        if !self.session.is_live() {
            return;
        }
        let editing = self.page.editing();
        let lifted = self.gate.is_user_dragging();
        for endpoint in [Endpoint::Origin, Endpoint::Destination] {
            let id = MarkerId::draft(endpoint);
            let coords = self.store(endpoint).coords();
            let result = match coords {
                Some(at) if self.markers_visible && editing == Some(endpoint) => {
                    let icon = if lifted {
                        IconVariant::DraftLifted
                    } else {
                        IconVariant::DraftResting
                    };
                    self.session
                        .upsert_marker(&mut self.canvas, id, at, icon)
                        .map(|_| ())
                }
                _ => self.session.detach_marker(&mut self.canvas, id),
            };
            self.absorb(result);
        }
    }

    fn notify(&mut self, message: &str, severity: Severity) {
        self.outbox.push(Effect::Notify(Notification {
            message: message.to_string(),
            severity,
            duration_ms: self.config.notify_duration_ms,
        }));
    }

    /// The one place engine errors stop. Benign ones are logged, the rest become notifications.
    fn absorb<T>(&mut self, result: Result<T, MapError>) -> Option<T> {
        match result {
            Ok(x) => Some(x),
            Err(err) if err.is_benign() => {
                log::debug!("Ignoring: {}", err);
                None
            }
            Err(MapError::UpstreamFailure(err)) => {
                log::warn!("Upstream failure: {}", err);
                let message = if err.message.is_empty() {
                    self.config.fallback_error_message.clone()
                } else {
                    err.message
                };
                self.notify(&message, Severity::Error);
                None
            }
            Err(err) => {
                log::warn!("Map unavailable: {}", err);
                let message = self.config.fallback_error_message.clone();
                self.notify(&message, Severity::Error);
                None
            }
        }
    }
}
