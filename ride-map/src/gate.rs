use std::time::Duration;

use ride_map_model::{Endpoint, PageContext, RouteStatus};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GateState {
    Idle,
    UserInteracting,
    SuppressedBySearch,
    SuppressedByRouteInstalled,
}

/// `isSearching`: nobody searched yet, a search moved the map, or the user took over since.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SearchFlag {
    #[default]
    Unset,
    Searching,
    Cleared,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InteractionKind {
    Drag,
    Zoom,
}

/// A one-shot settle action. Replaced, never stacked: at most one is pending.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SettleTimer {
    pub id: u64,
    pub kind: InteractionKind,
    pub due: Duration,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SettleVerdict {
    /// Write the current map centre into this endpoint's store, provisionally
    Commit(Endpoint),
    SuppressedByRoute,
    SuppressedBySearch,
    /// The page doesn't edit coordinates
    Ignored,
}

/// Decides whether a drag or zoom is allowed to move the origin or destination. Time is passed
/// in by the caller (elapsed since the host started), so the gate never reads a clock.
#[derive(Debug)]
pub struct InteractionGate {
    state: GateState,
    search: SearchFlag,
    dragging: bool,
    page: PageContext,
    pending: Option<SettleTimer>,
    next_timer: u64,
    drag_delay: Duration,
    zoom_delay: Duration,
}

impl InteractionGate {
    pub fn new(page: PageContext, drag_delay: Duration, zoom_delay: Duration) -> Self {
        Self {
            state: GateState::Idle,
            search: SearchFlag::Unset,
            dragging: false,
            page,
            pending: None,
            next_timer: 0,
            drag_delay,
            zoom_delay,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn search(&self) -> SearchFlag {
        self.search
    }

    pub fn is_user_dragging(&self) -> bool {
        self.dragging
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    pub fn pending(&self) -> Option<SettleTimer> {
        self.pending
    }

    /// New quiet windows for timers armed from now on. A timer already pending keeps its due time.
    pub fn set_delays(&mut self, drag_delay: Duration, zoom_delay: Duration) {
        self.drag_delay = drag_delay;
        self.zoom_delay = zoom_delay;
    }

    /// A search is about to move the map programmatically; its settle mustn't overwrite the
    /// search result.
    pub fn start_search(&mut self) {
        self.search = SearchFlag::Searching;
    }

    /// drag-start / zoom-start. Any pending settle is cancelled, so a stale centre can never be
    /// committed after the user grabs the map again.
    pub fn begin(&mut self, kind: InteractionKind) {
        if self.search == SearchFlag::Searching {
            self.search = SearchFlag::Cleared;
        }
        if let Some(timer) = self.pending.take() {
            log::debug!("{:?} start cancels pending settle {}", kind, timer.id);
        }
        if self.page == PageContext::ConfirmRide {
            self.state = GateState::Idle;
            return;
        }
        self.dragging = true;
        self.state = GateState::UserInteracting;
    }

    /// drag-end / zoom-end. Arms the settle timer, replacing an older one.
    pub fn end(&mut self, kind: InteractionKind, now: Duration) -> Option<SettleTimer> {
        self.dragging = false;
        if self.page == PageContext::ConfirmRide {
            return None;
        }
        self.next_timer += 1;
        let delay = match kind {
            InteractionKind::Drag => self.drag_delay,
            InteractionKind::Zoom => self.zoom_delay,
        };
        let timer = SettleTimer {
            id: self.next_timer,
            kind,
            due: now + delay,
        };
        self.pending = Some(timer);
        Some(timer)
    }

    /// Fires the pending settle if it's due. Returns a verdict at most once per timer.
    pub fn poll(&mut self, now: Duration, route: RouteStatus) -> Option<SettleVerdict> {
        match self.pending {
            Some(timer) if timer.due <= now => {
                self.pending = None;
            }
            _ => return None,
        }
        self.dragging = false;

        let verdict = if route.is_attempted() {
            self.state = GateState::SuppressedByRouteInstalled;
            SettleVerdict::SuppressedByRoute
        } else if let Some(endpoint) = self.page.editing() {
            if self.search == SearchFlag::Searching {
                self.state = GateState::SuppressedBySearch;
                SettleVerdict::SuppressedBySearch
            } else {
                self.state = GateState::Idle;
                SettleVerdict::Commit(endpoint)
            }
        } else {
            self.state = GateState::Idle;
            SettleVerdict::Ignored
        };
        log::debug!("Settle on {}: {:?}", self.page.path(), verdict);
        Some(verdict)
    }

    /// A page change. Whatever was pending belonged to the old page.
    pub fn reset(&mut self, page: PageContext) {
        self.pending = None;
        self.dragging = false;
        self.search = SearchFlag::Unset;
        self.state = GateState::Idle;
        self.page = page;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(x: u64) -> Duration {
        Duration::from_millis(x)
    }

    fn gate(page: PageContext) -> InteractionGate {
        InteractionGate::new(page, ms(800), ms(0))
    }

    #[test]
    fn drag_settles_after_quiet_window() {
        let mut gate = gate(PageContext::SetOrigin);
        gate.begin(InteractionKind::Drag);
        assert_eq!(gate.state(), GateState::UserInteracting);
        assert!(gate.is_user_dragging());

        gate.end(InteractionKind::Drag, ms(1000));
        assert!(!gate.is_user_dragging());
        assert_eq!(gate.poll(ms(1799), RouteStatus::NotAttempted), None);
        assert_eq!(
            gate.poll(ms(1800), RouteStatus::NotAttempted),
            Some(SettleVerdict::Commit(Endpoint::Origin))
        );
        // Exactly once
        assert_eq!(gate.poll(ms(5000), RouteStatus::NotAttempted), None);
        assert_eq!(gate.state(), GateState::Idle);
    }

    #[test]
    fn restart_inside_window_cancels_settle() {
        let mut gate = gate(PageContext::SetDestination);
        gate.begin(InteractionKind::Drag);
        gate.end(InteractionKind::Drag, ms(0));
        gate.begin(InteractionKind::Drag);
        assert_eq!(gate.pending(), None);
        // The old deadline passes with nothing to fire
        assert_eq!(gate.poll(ms(900), RouteStatus::NotAttempted), None);

        let timer = gate.end(InteractionKind::Drag, ms(1000)).unwrap();
        assert_eq!(timer.due, ms(1800));
        assert_eq!(
            gate.poll(ms(1800), RouteStatus::NotAttempted),
            Some(SettleVerdict::Commit(Endpoint::Destination))
        );
    }

    #[test]
    fn installed_route_locks_coordinates() {
        for route in [RouteStatus::Installed, RouteStatus::Unavailable] {
            let mut gate = gate(PageContext::SetDestination);
            gate.begin(InteractionKind::Zoom);
            gate.end(InteractionKind::Zoom, ms(10));
            assert_eq!(gate.poll(ms(10), route), Some(SettleVerdict::SuppressedByRoute));
            assert_eq!(gate.state(), GateState::SuppressedByRouteInstalled);
        }
    }

    #[test]
    fn search_suppresses_until_user_moves() {
        let mut gate = gate(PageContext::SetDestination);
        gate.start_search();
        // The programmatic move ends in a zoom-end without a start from the user
        gate.end(InteractionKind::Zoom, ms(0));
        assert_eq!(
            gate.poll(ms(0), RouteStatus::NotAttempted),
            Some(SettleVerdict::SuppressedBySearch)
        );
        assert_eq!(gate.state(), GateState::SuppressedBySearch);

        gate.begin(InteractionKind::Drag);
        assert_eq!(gate.search(), SearchFlag::Cleared);
        gate.end(InteractionKind::Drag, ms(100));
        assert_eq!(
            gate.poll(ms(900), RouteStatus::NotAttempted),
            Some(SettleVerdict::Commit(Endpoint::Destination))
        );
    }

    #[test]
    fn confirm_page_is_visual_only() {
        let mut gate = gate(PageContext::ConfirmRide);
        gate.start_search();
        gate.begin(InteractionKind::Drag);
        assert_eq!(gate.state(), GateState::Idle);
        assert!(!gate.is_user_dragging());
        // Still clears a programmatic search
        assert_eq!(gate.search(), SearchFlag::Cleared);
        assert_eq!(gate.end(InteractionKind::Drag, ms(0)), None);
        assert_eq!(gate.poll(ms(10_000), RouteStatus::NotAttempted), None);
    }

    #[test]
    fn page_change_drops_pending_settle() {
        let mut gate = gate(PageContext::SetOrigin);
        gate.begin(InteractionKind::Drag);
        gate.end(InteractionKind::Drag, ms(0));
        gate.reset(PageContext::SetDestination);
        assert_eq!(gate.poll(ms(800), RouteStatus::NotAttempted), None);
        assert_eq!(gate.page(), &PageContext::SetDestination);
    }

    #[test]
    fn new_delays_keep_the_pending_settle() {
        let mut gate = gate(PageContext::SetOrigin);
        gate.begin(InteractionKind::Drag);
        gate.end(InteractionKind::Drag, ms(0));
        gate.set_delays(ms(2000), ms(0));
        assert_eq!(
            gate.poll(ms(800), RouteStatus::NotAttempted),
            Some(SettleVerdict::Commit(Endpoint::Origin))
        );

        gate.begin(InteractionKind::Drag);
        gate.end(InteractionKind::Drag, ms(1000));
        assert_eq!(gate.poll(ms(2999), RouteStatus::NotAttempted), None);
        assert!(gate.poll(ms(3000), RouteStatus::NotAttempted).is_some());
    }

    #[test]
    fn pages_without_a_store_ignore_settles() {
        let mut gate = gate(PageContext::Other("/profile".to_string()));
        gate.begin(InteractionKind::Drag);
        gate.end(InteractionKind::Drag, ms(0));
        assert_eq!(
            gate.poll(ms(800), RouteStatus::NotAttempted),
            Some(SettleVerdict::Ignored)
        );
    }
}
