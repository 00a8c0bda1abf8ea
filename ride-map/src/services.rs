//! The collaborators the engine talks to but doesn't own: location, geocoding, routing, the
//! key-value store holding session identifiers, navigation and notifications. HTTP transport and
//! authentication live behind these traits.
//!
//! Everything runs on one UI thread, so the async traits don't promise `Send` futures.
#![allow(async_fn_in_trait)]

use std::cell::RefCell;
use std::collections::BTreeMap;

use geo::LineString;
use tokio::sync::mpsc::UnboundedReceiver;

use ride_map_model::{Address, Coordinate, Notification, RouteSummary};

use crate::error::UpstreamError;

pub const CLIENT_ID_KEY: &str = "clientOneId";
pub const TOKEN_KEY: &str = "auth_token";

pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str);
    async fn remove(&self, key: &str);
    async fn clear(&self);
}

pub trait LocationProvider {
    async fn get_coords(&self) -> Result<Coordinate, UpstreamError>;
    /// Positions keep arriving until the provider drops the sender.
    fn watch_coords(&self) -> UnboundedReceiver<Coordinate>;
}

pub trait Geocoder {
    async fn search(&self, query: &str, ctx: &RequestContext)
        -> Result<Vec<Address>, UpstreamError>;
    async fn reverse(&self, at: Coordinate, ctx: &RequestContext) -> Result<Address, UpstreamError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouteComputation {
    pub geometry: LineString,
    pub summary: RouteSummary,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RouteReply {
    Found(RouteComputation),
    /// The service worked, but there's no route between these points
    NotFound,
}

pub trait RoutingService {
    async fn compute_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        ctx: &RequestContext,
    ) -> Result<RouteReply, UpstreamError>;
}

pub trait Navigator {
    fn current_path(&self) -> String;
    fn navigate(&mut self, path: &str);
}

pub trait Notifier {
    fn notify(&mut self, notification: &Notification);
}

/// Identifies the client to the geocoding and routing services.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestContext {
    pub client_id: String,
    pub token: String,
}

impl RequestContext {
    /// Reads both identifiers. If either is missing (or was stored as the strings "undefined" or
    /// "null"), both are wiped and the client has to register again.
    pub async fn load<S: KeyValueStore>(store: &S) -> Option<RequestContext> {
        let client_id = usable(store.get(CLIENT_ID_KEY).await);
        let token = usable(store.get(TOKEN_KEY).await);
        match (client_id, token) {
            (Some(client_id), Some(token)) => Some(RequestContext { client_id, token }),
            _ => {
                log::info!("No usable session identifiers, clearing them");
                store.remove(CLIENT_ID_KEY).await;
                store.remove(TOKEN_KEY).await;
                None
            }
        }
    }

    pub async fn save<S: KeyValueStore>(&self, store: &S) {
        store.set(CLIENT_ID_KEY, &self.client_id).await;
        store.set(TOKEN_KEY, &self.token).await;
    }
}

fn usable(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty() && v != "undefined" && v != "null")
}

/// A `KeyValueStore` that forgets everything when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.values.borrow().get(key).cloned()
    }

    async fn set(&self, key: &str, value: &str) {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    async fn remove(&self, key: &str) {
        self.values.borrow_mut().remove(key);
    }

    async fn clear(&self) {
        self.values.borrow_mut().clear();
    }
}
