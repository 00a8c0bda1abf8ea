//! Plays a scripted ride-booking session against the engine, with stand-ins for the location,
//! geocoding and routing services. Useful for trying out settle timings and tariffs without a
//! device.

use std::time::Duration;

use anyhow::{bail, Result};
use geo::{line_measures::LengthMeasurable, Coord, Haversine, LineString};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use ride_map::{
    compute_route, follow_location, load_map_with_location, resolve_address, search_place,
    Geocoder, LocationProvider, MapConfig, Navigator, Notifier, RequestContext, RideMap,
    RouteComputation, RouteReply, RoutingService, SceneCanvas, UpstreamError,
};
use ride_map_model::{
    Address, Coordinate, Endpoint, MarkerId, Notification, PageContext, Price, RouteDistance,
    RouteDuration, RouteSummary,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default)]
    pub config: MapConfig,
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default = "default_page")]
    pub start_page: String,
    /// What the location provider reports on request. None simulates GPS being off.
    pub location: Option<Coordinate>,
    #[serde(default)]
    pub tariff: Tariff,
    /// The gazetteer the stand-in geocoder searches
    #[serde(default)]
    pub places: Vec<Address>,
    pub steps: Vec<Step>,
}

fn default_container() -> String {
    "map".to_string()
}

fn default_page() -> String {
    "/ride/setOrigin".to_string()
}

impl Scenario {
    pub fn from_json(raw: &str) -> Result<Scenario> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// One thing the rider or the router does. Times are milliseconds since the session started.
#[derive(Deserialize)]
#[serde(tag = "step", rename_all = "camelCase")]
pub enum Step {
    EnterPage {
        path: String,
    },
    LoadMap,
    Drag {
        to: Coordinate,
        ms: u64,
    },
    Zoom {
        to: Coordinate,
        ms: u64,
    },
    Tick {
        ms: u64,
    },
    /// GPS fixes arriving one after another
    Follow {
        track: Vec<Coordinate>,
    },
    Search {
        query: String,
        #[serde(default)]
        pick: usize,
    },
    ResolveAddress {
        endpoint: Endpoint,
    },
    Route,
    ClickMarker {
        id: MarkerId,
    },
    TeardownRoute {
        #[serde(default)]
        recenter: bool,
    },
    DestroyMap,
}

/// How the stand-in router prices a trip.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Tariff {
    pub base: f64,
    pub per_km: f64,
    pub currency: String,
    pub speed_kmh: f64,
}

impl Default for Tariff {
    fn default() -> Self {
        Self {
            base: 5000.0,
            per_km: 1500.0,
            currency: "UZS".to_string(),
            speed_kmh: 30.0,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub page: String,
    pub visited: Vec<String>,
    pub has_map: bool,
    pub origin: Option<Coordinate>,
    pub destination: Option<Coordinate>,
    pub origin_address: Option<Address>,
    pub destination_address: Option<Address>,
    pub route_status: String,
    pub route: RouteSummary,
    pub notifications: Vec<Notification>,
    /// The final scene, for viewing in any GeoJSON tool
    #[serde(skip)]
    pub geojson: String,
}

pub async fn run(scenario: Scenario) -> Result<Report> {
    let page = PageContext::from_path(&scenario.start_page);
    let mut trail = Trail::new(page.path());
    let mut inbox = Inbox::default();
    let map = RideMap::new(
        SceneCanvas::with_container(&scenario.container),
        scenario.config,
        page,
    )
    .shared();
    let router = StraightLineRouter::new(scenario.tariff);
    let places = PlaceBook::new(scenario.places);
    let location = ScriptedLocation {
        start: scenario.location,
        track: Vec::new(),
    };
    let ctx = RequestContext {
        client_id: "sim".to_string(),
        token: "sim".to_string(),
    };

    for (idx, step) in scenario.steps.into_iter().enumerate() {
        match step {
            Step::EnterPage { path } => {
                trail.navigate(&path);
                map.borrow_mut().enter_page(PageContext::from_path(&path));
            }
            Step::LoadMap => {
                if !load_map_with_location(&map, &location, &scenario.container).await {
                    log::warn!("Step {}: no map on {}", idx, trail.path);
                }
            }
            Step::Drag { to, ms } => {
                let mut map = map.borrow_mut();
                let view = map.session().view()?;
                map.on_drag_start();
                map.canvas_mut().pan(view, to)?;
                map.on_drag_end(Duration::from_millis(ms));
            }
            Step::Zoom { to, ms } => {
                let mut map = map.borrow_mut();
                let view = map.session().view()?;
                map.on_zoom_start();
                map.canvas_mut().pan(view, to)?;
                map.on_zoom_end(Duration::from_millis(ms));
            }
            Step::Tick { ms } => {
                map.borrow_mut().tick(Duration::from_millis(ms));
            }
            Step::Follow { track } => {
                let gps = ScriptedLocation { start: None, track };
                follow_location(&map, &gps).await;
            }
            Step::Search { query, pick } => {
                let results = search_place(&map, &places, &ctx, &query).await;
                let Some(choice) = results.get(pick) else {
                    bail!(
                        "Step {}: searching {:?} found {} places, can't pick #{}",
                        idx,
                        query,
                        results.len(),
                        pick
                    );
                };
                log::info!("Picked {}", choice.name);
                map.borrow_mut().apply_search_result(choice.coordinate);
            }
            Step::ResolveAddress { endpoint } => {
                if let Some(address) = resolve_address(&map, &places, &ctx, endpoint).await {
                    log::info!("{:?} is at {}", endpoint, address.name);
                }
            }
            Step::Route => {
                let status = compute_route(&map, &router, &ctx).await;
                log::info!("Step {}: route {:?}", idx, status);
            }
            Step::ClickMarker { id } => {
                map.borrow_mut().on_marker_click(id);
            }
            Step::TeardownRoute { recenter } => {
                map.borrow_mut().teardown_route(recenter);
            }
            Step::DestroyMap => {
                map.borrow_mut().destroy_map();
            }
        }
        map.borrow_mut().flush(&mut trail, &mut inbox);
    }

    let map = map.borrow();
    let geojson = match map.session().view() {
        Ok(view) => map.canvas().render_geojson(view),
        Err(_) => r#"{"type":"FeatureCollection","features":[]}"#.to_string(),
    };
    Ok(Report {
        page: map.page().path().to_string(),
        visited: trail.visited,
        has_map: map.has_map(),
        origin: map.store(Endpoint::Origin).coords(),
        destination: map.store(Endpoint::Destination).coords(),
        origin_address: map.store(Endpoint::Origin).address().cloned(),
        destination_address: map.store(Endpoint::Destination).address().cloned(),
        route_status: format!("{:?}", map.overlay().status()),
        route: map.overlay().summary().clone(),
        notifications: inbox.0,
        geojson,
    })
}

/// Routes in a straight line and prices by distance.
pub struct StraightLineRouter {
    tariff: Tariff,
}

impl StraightLineRouter {
    pub fn new(tariff: Tariff) -> Self {
        Self { tariff }
    }

    fn summarize(&self, meters: f64) -> RouteSummary {
        let km = meters / 1000.0;
        // Fares are quoted in whole hundreds
        let fare = ((self.tariff.base + self.tariff.per_km * km) / 100.0).round() * 100.0;
        let hours = km / self.tariff.speed_kmh.max(1.0);
        RouteSummary {
            price: Price {
                amount: Some(fare),
                currency: Some(self.tariff.currency.clone()),
            },
            distance: RouteDistance::from_meters(meters),
            duration: RouteDuration::from_seconds((hours * 3600.0).round() as u64),
        }
    }
}

impl RoutingService for StraightLineRouter {
    async fn compute_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        _: &RequestContext,
    ) -> Result<RouteReply, UpstreamError> {
        let geometry = LineString::new(vec![Coord::from(origin), Coord::from(destination)]);
        let meters = geometry.length(&Haversine);
        if meters < 1.0 {
            return Ok(RouteReply::NotFound);
        }
        Ok(RouteReply::Found(RouteComputation {
            summary: self.summarize(meters),
            geometry,
        }))
    }
}

/// A geocoder over a fixed list of places.
pub struct PlaceBook {
    places: Vec<Address>,
}

impl PlaceBook {
    pub fn new(places: Vec<Address>) -> Self {
        Self { places }
    }
}

impl Geocoder for PlaceBook {
    async fn search(
        &self,
        query: &str,
        _: &RequestContext,
    ) -> Result<Vec<Address>, UpstreamError> {
        let query = query.to_lowercase();
        Ok(self
            .places
            .iter()
            .filter(|place| place.name.to_lowercase().contains(&query))
            .cloned()
            .collect())
    }

    async fn reverse(&self, at: Coordinate, _: &RequestContext) -> Result<Address, UpstreamError> {
        self.places
            .iter()
            .map(|place| (meters_between(at, place.coordinate), place))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, place)| place.clone())
            .ok_or_else(|| UpstreamError::new("No address found for this point"))
    }
}

fn meters_between(a: Coordinate, b: Coordinate) -> f64 {
    LineString::new(vec![Coord::from(a), Coord::from(b)]).length(&Haversine)
}

struct ScriptedLocation {
    start: Option<Coordinate>,
    track: Vec<Coordinate>,
}

impl LocationProvider for ScriptedLocation {
    async fn get_coords(&self) -> Result<Coordinate, UpstreamError> {
        self.start
            .ok_or_else(|| UpstreamError::new("Turn on location to pick a pickup point"))
    }

    fn watch_coords(&self) -> mpsc::UnboundedReceiver<Coordinate> {
        let (tx, rx) = mpsc::unbounded_channel();
        for at in &self.track {
            if tx.send(*at).is_err() {
                break;
            }
        }
        rx
    }
}

struct Trail {
    path: String,
    visited: Vec<String>,
}

impl Trail {
    fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            visited: vec![path.to_string()],
        }
    }
}

impl Navigator for Trail {
    fn current_path(&self) -> String {
        self.path.clone()
    }

    fn navigate(&mut self, path: &str) {
        log::info!("Navigating to {}", path);
        self.path = path.to_string();
        self.visited.push(path.to_string());
    }
}

#[derive(Default)]
struct Inbox(Vec<Notification>);

impl Notifier for Inbox {
    fn notify(&mut self, notification: &Notification) {
        log::info!("[{:?}] {}", notification.severity, notification.message);
        self.0.push(notification.clone());
    }
}
