//! The async side of the engine. Each helper borrows the map only between awaits and checks on
//! resume that the page, ticket or coordinate it started with is still current.

use std::cell::RefCell;
use std::rc::Rc;

use ride_map_model::{Address, Endpoint, RouteStatus};

use crate::canvas::MapCanvas;
use crate::error::MapError;
use crate::services::{Geocoder, LocationProvider, RequestContext, RoutingService};
use crate::RideMap;

pub type SharedRideMap<C> = Rc<RefCell<RideMap<C>>>;

impl<C: MapCanvas> RideMap<C> {
    pub fn shared(self) -> SharedRideMap<C> {
        Rc::new(RefCell::new(self))
    }
}

/// Loads the map once a position is known, asking the location provider first if needed. False
/// if the page changed while waiting or no map could be made.
pub async fn load_map_with_location<C: MapCanvas, L: LocationProvider>(
    map: &SharedRideMap<C>,
    location: &L,
    container: &str,
) -> bool {
    let (epoch, known) = {
        let map = map.borrow();
        let known = map.real_location().is_some() || map.store(Endpoint::Origin).coords().is_some();
        (map.epoch(), known)
    };

    if !known {
        map.borrow_mut().set_loading(true);
        let fix = location.get_coords().await;

        let mut map = map.borrow_mut();
        map.set_loading(false);
        if map.epoch() != epoch {
            log::debug!("Page changed while waiting for a position");
            return false;
        }
        match fix {
            Ok(here) => map.on_location_update(here),
            Err(err) => {
                map.absorb::<()>(Err(err.into()));
                return false;
            }
        }
    }

    map.borrow_mut().load_map(container)
}

/// Asks for a route between the current origin and destination and installs the answer. None if
/// either endpoint is unknown.
pub async fn compute_route<C: MapCanvas, R: RoutingService>(
    map: &SharedRideMap<C>,
    router: &R,
    ctx: &RequestContext,
) -> Option<RouteStatus> {
    let (ticket, origin, destination) = map.borrow_mut().begin_route()?;

    let reply = router.compute_route(origin, destination, ctx).await;

    Some(map.borrow_mut().finish_route(ticket, origin, destination, reply))
}

/// Looks up places matching `query`. Results for a search that was superseded, or that outlived
/// its page, come back empty. Picking one is `RideMap::apply_search_result`.
pub async fn search_place<C: MapCanvas, G: Geocoder>(
    map: &SharedRideMap<C>,
    geocoder: &G,
    ctx: &RequestContext,
    query: &str,
) -> Vec<Address> {
    let token = map.borrow_mut().begin_search();
    let results = geocoder.search(query, ctx).await;

    let mut map = map.borrow_mut();
    if !map.is_current_search(token) {
        log::debug!("Dropping results for superseded search {:?}", query);
        return Vec::new();
    }
    map.absorb(results.map_err(MapError::from)).unwrap_or_default()
}

/// Names the place at one endpoint. The answer is dropped if the endpoint moved meanwhile.
pub async fn resolve_address<C: MapCanvas, G: Geocoder>(
    map: &SharedRideMap<C>,
    geocoder: &G,
    ctx: &RequestContext,
    endpoint: Endpoint,
) -> Option<Address> {
    let (at, revision) = {
        let map = map.borrow();
        let store = map.store(endpoint);
        (store.coords()?, store.revision())
    };

    let reply = geocoder.reverse(at, ctx).await;

    let mut map = map.borrow_mut();
    let address = map.absorb(reply.map_err(MapError::from))?;
    if !map.store_mut(endpoint).set_address(revision, address.clone()) {
        log::debug!("{:?} moved while resolving its address", endpoint);
        return None;
    }
    Some(address)
}

/// Feeds every position from the provider's watch stream into the map, until the provider stops.
/// Returns how many positions arrived.
pub async fn follow_location<C: MapCanvas, L: LocationProvider>(
    map: &SharedRideMap<C>,
    location: &L,
) -> usize {
    let mut positions = location.watch_coords();
    let mut count = 0;
    while let Some(here) = positions.recv().await {
        map.borrow_mut().on_location_update(here);
        count += 1;
    }
    log::info!("Location stream ended after {} positions", count);
    count
}
