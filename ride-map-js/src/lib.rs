#[cfg(target_arch = "wasm32")]
use std::sync::Once;
use std::time::Duration;

use geo::LineString;
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use ride_map::{
    Effect, MapConfig, RideMap, RouteComputation, RouteReply, RouteTicket, SceneCanvas,
    UpstreamError,
};
use ride_map_model::{Coordinate, MarkerId, Notification, PageContext, RouteSummary};

#[cfg(target_arch = "wasm32")]
static START: Once = Once::new();

/// The engine as seen from a web view. The page owns the real map widget: it forwards widget
/// events here, redraws from `renderGeojson`, and carries out `takeEffects`.
#[wasm_bindgen]
pub struct JsRideMap {
    map: RideMap<SceneCanvas>,
    // The request started by beginRoute, waiting for finishRoute
    route_request: Option<(RouteTicket, Coordinate, Coordinate)>,
}

/// What the page's routing call came back with
#[derive(Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
enum RouteAnswer {
    #[serde(rename_all = "camelCase")]
    Found {
        // [lng, lat] pairs, as GeoJSON has them
        coordinates: Vec<[f64; 2]>,
        #[serde(default)]
        summary: RouteSummary,
    },
    NotFound,
    Failed {
        #[serde(default)]
        message: String,
    },
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum JsEffect {
    Navigate { path: String },
    Notify(Notification),
}

#[derive(Serialize)]
struct RouteEndpoints {
    origin: Coordinate,
    destination: Coordinate,
}

#[wasm_bindgen]
impl JsRideMap {
    #[wasm_bindgen(constructor)]
    pub fn new(path: &str) -> JsRideMap {
        #[cfg(target_arch = "wasm32")]
        START.call_once(|| {
            // Panics shouldn't happen, but if they do, console.log them.
            console_error_panic_hook::set_once();
            if let Err(err) = console_log::init_with_level(log::Level::Info) {
                web_sys::console::log_1(&format!("No logging: {}", err).into());
            }
        });

        Self {
            map: RideMap::new(
                SceneCanvas::new(),
                MapConfig::default(),
                PageContext::from_path(path),
            ),
            route_request: None,
        }
    }

    #[wasm_bindgen(js_name = setConfig)]
    pub fn set_config(&mut self, input: JsValue) {
        match serde_wasm_bindgen::from_value::<MapConfig>(input) {
            Ok(config) => {
                self.map.set_config(config);
            }
            Err(err) => {
                web_sys::console::log_1(&format!("Bad input to setConfig: {}", err).into());
            }
        }
    }

    /// Declares a DOM node the map may be mounted into.
    #[wasm_bindgen(js_name = addContainer)]
    pub fn add_container(&mut self, id: &str) {
        self.map.canvas_mut().add_container(id);
    }

    #[wasm_bindgen(js_name = removeContainer)]
    pub fn remove_container(&mut self, id: &str) {
        self.map.canvas_mut().remove_container(id);
    }

    #[wasm_bindgen(js_name = enterPage)]
    pub fn enter_page(&mut self, path: &str) {
        self.route_request = None;
        self.map.enter_page(PageContext::from_path(path));
    }

    #[wasm_bindgen(js_name = loadMap)]
    pub fn load_map(&mut self, container: &str) -> bool {
        self.map.load_map(container)
    }

    #[wasm_bindgen(js_name = hasMap)]
    pub fn has_map(&self) -> bool {
        self.map.has_map()
    }

    #[wasm_bindgen(js_name = onTilesLoaded)]
    pub fn on_tiles_loaded(&mut self) -> bool {
        self.map.on_tiles_loaded()
    }

    #[wasm_bindgen(js_name = onDragStart)]
    pub fn on_drag_start(&mut self) {
        self.map.on_drag_start();
    }

    #[wasm_bindgen(js_name = onZoomStart)]
    pub fn on_zoom_start(&mut self) {
        self.map.on_zoom_start();
    }

    /// `lon`/`lat` is where the widget's centre ended up; `now_ms` is `performance.now()`.
    #[wasm_bindgen(js_name = onDragEnd)]
    pub fn on_drag_end(&mut self, lon: f64, lat: f64, now_ms: f64) {
        self.sync_center(lon, lat);
        self.map.on_drag_end(millis(now_ms));
    }

    #[wasm_bindgen(js_name = onZoomEnd)]
    pub fn on_zoom_end(&mut self, lon: f64, lat: f64, now_ms: f64) {
        self.sync_center(lon, lat);
        self.map.on_zoom_end(millis(now_ms));
    }

    pub fn tick(&mut self, now_ms: f64) {
        self.map.tick(millis(now_ms));
    }

    #[wasm_bindgen(js_name = onLocationUpdate)]
    pub fn on_location_update(&mut self, lon: f64, lat: f64) {
        self.map.on_location_update(Coordinate::new(lat, lon));
    }

    /// `id` is the marker's id from `renderGeojson`. Unknown ids are ignored.
    #[wasm_bindgen(js_name = onMarkerClick)]
    pub fn on_marker_click(&mut self, id: &str) {
        match MarkerId::parse(id) {
            Some(id) => self.map.on_marker_click(id),
            None => log::warn!("Click on unknown marker {}", id),
        }
    }

    #[wasm_bindgen(js_name = applySearchResult)]
    pub fn apply_search_result(&mut self, lon: f64, lat: f64) {
        self.map.apply_search_result(Coordinate::new(lat, lon));
    }

    /// Returns `{origin, destination}` for the page to route between, or nothing if either is
    /// unknown. Only the latest request is kept.
    #[wasm_bindgen(js_name = beginRoute)]
    pub fn begin_route(&mut self) -> Result<JsValue, JsValue> {
        let Some((ticket, origin, destination)) = self.map.begin_route() else {
            self.route_request = None;
            return Ok(JsValue::UNDEFINED);
        };
        self.route_request = Some((ticket, origin, destination));
        serde_wasm_bindgen::to_value(&RouteEndpoints {
            origin,
            destination,
        })
        .map_err(|err| JsValue::from_str(&err.to_string()))
    }

    /// Takes the routing answer for the latest `beginRoute` as JSON, tagged by `outcome`.
    #[wasm_bindgen(js_name = finishRoute)]
    pub fn finish_route(&mut self, raw: &str) -> Result<(), JsValue> {
        let answer: RouteAnswer =
            serde_json::from_str(raw).map_err(|err| JsValue::from_str(&err.to_string()))?;
        let Some((ticket, origin, destination)) = self.route_request.take() else {
            log::debug!("Route answer with no request outstanding");
            return Ok(());
        };

        let reply = match answer {
            RouteAnswer::Found {
                coordinates,
                summary,
            } => Ok(RouteReply::Found(RouteComputation {
                geometry: LineString::from(
                    coordinates
                        .into_iter()
                        .map(|[lon, lat]| (lon, lat))
                        .collect::<Vec<_>>(),
                ),
                summary,
            })),
            RouteAnswer::NotFound => Ok(RouteReply::NotFound),
            RouteAnswer::Failed { message } => Err(UpstreamError::new(message)),
        };
        self.map.finish_route(ticket, origin, destination, reply);
        Ok(())
    }

    #[wasm_bindgen(js_name = teardownRoute)]
    pub fn teardown_route(&mut self, recenter_on_destination: bool) {
        self.map.teardown_route(recenter_on_destination);
    }

    #[wasm_bindgen(js_name = routeSummary)]
    pub fn route_summary(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.map.overlay().summary())
            .map_err(|err| JsValue::from_str(&err.to_string()))
    }

    #[wasm_bindgen(js_name = destroyMap)]
    pub fn destroy_map(&mut self) {
        self.map.destroy_map();
    }

    #[wasm_bindgen(js_name = setInteractionsEnabled)]
    pub fn set_interactions_enabled(&mut self, enabled: bool) {
        self.map.set_interactions_enabled(enabled);
    }

    #[wasm_bindgen(js_name = isMarkerAnimating)]
    pub fn is_marker_animating(&self) -> bool {
        self.map.is_marker_animating()
    }

    /// Markers and the route as a FeatureCollection. Empty when there's no map.
    #[wasm_bindgen(js_name = renderGeojson)]
    pub fn render_geojson(&self) -> String {
        match self.map.session().view() {
            Ok(view) => self.map.canvas().render_geojson(view),
            Err(_) => r#"{"type":"FeatureCollection","features":[]}"#.to_string(),
        }
    }

    /// Navigation and notifications for the page to carry out, in order, as a JSON array.
    #[wasm_bindgen(js_name = takeEffects)]
    pub fn take_effects(&mut self) -> Result<String, JsValue> {
        let effects: Vec<JsEffect> = self
            .map
            .take_effects()
            .into_iter()
            .map(|effect| match effect {
                Effect::Navigate(page) => JsEffect::Navigate {
                    path: page.path().to_string(),
                },
                Effect::Notify(notification) => JsEffect::Notify(notification),
            })
            .collect();
        serde_json::to_string(&effects).map_err(|err| JsValue::from_str(&err.to_string()))
    }
}

impl JsRideMap {
    fn sync_center(&mut self, lon: f64, lat: f64) {
        if let Ok(view) = self.map.session().view() {
            if let Err(err) = self.map.canvas_mut().pan(view, Coordinate::new(lat, lon)) {
                log::debug!("Widget moved a view we don't have: {}", err);
            }
        }
    }
}

fn millis(ms: f64) -> Duration {
    Duration::from_millis(ms.max(0.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_answer_formats() {
        let found: RouteAnswer = serde_json::from_str(
            r#"{"outcome": "found", "coordinates": [[69.2, 41.3], [69.3, 41.4]]}"#,
        )
        .unwrap();
        assert!(matches!(found, RouteAnswer::Found { ref coordinates, .. } if coordinates.len() == 2));

        let failed: RouteAnswer =
            serde_json::from_str(r#"{"outcome": "failed", "message": "Try later"}"#).unwrap();
        assert!(matches!(failed, RouteAnswer::Failed { ref message } if message == "Try later"));

        let none: RouteAnswer = serde_json::from_str(r#"{"outcome": "notFound"}"#).unwrap();
        assert!(matches!(none, RouteAnswer::NotFound));
    }

    #[test]
    fn test_route_through_the_page() {
        let mut js = JsRideMap::new("/ride/letsgo");
        js.add_container("map");
        js.on_location_update(69.2, 41.3);
        assert!(js.load_map("map"));
        js.map.enter_page(PageContext::SetDestination);
        js.apply_search_result(69.3, 41.4);
        js.enter_page("/ride/letsgo");

        let (ticket, origin, destination) = js.map.begin_route().unwrap();
        js.route_request = Some((ticket, origin, destination));
        assert!(js.is_marker_animating());
        js.finish_route(r#"{"outcome": "found", "coordinates": [[69.2, 41.3], [69.3, 41.4]]}"#)
            .unwrap();
        assert!(!js.is_marker_animating());
        assert!(js.render_geojson().contains("origin-marker-fixed"));

        js.on_marker_click("destination-marker-fixed");
        let effects = js.take_effects().unwrap();
        assert_eq!(effects, r#"[{"type":"navigate","path":"/ride/setDestination"}]"#);
    }
}
