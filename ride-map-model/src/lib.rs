use geo::{Coord, Point};
use serde::{Deserialize, Serialize};

/// A WGS84 position. Leaflet order (lat first) on the wire, GeoJSON order (lng first) when
/// converted to geo types.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug, Default)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// The original client treats a zeroed coordinate as "never set".
    pub fn is_set(&self) -> bool {
        self.lat != 0.0 && self.lng != 0.0
    }
}

impl From<Coordinate> for Coord {
    fn from(c: Coordinate) -> Self {
        Coord { x: c.lng, y: c.lat }
    }
}

impl From<Coordinate> for Point {
    fn from(c: Coordinate) -> Self {
        Point::new(c.lng, c.lat)
    }
}

impl From<Coord> for Coordinate {
    fn from(c: Coord) -> Self {
        Coordinate { lat: c.y, lng: c.x }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum MarkerId {
    #[serde(rename = "real-location-point")]
    RealLocation,
    #[serde(rename = "origin-marker")]
    OriginDraft,
    #[serde(rename = "destination-marker")]
    DestinationDraft,
    #[serde(rename = "origin-marker-fixed")]
    OriginFixed,
    #[serde(rename = "destination-marker-fixed")]
    DestinationFixed,
}

impl MarkerId {
    pub const ALL: [MarkerId; 5] = [
        MarkerId::RealLocation,
        MarkerId::OriginDraft,
        MarkerId::DestinationDraft,
        MarkerId::OriginFixed,
        MarkerId::DestinationFixed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MarkerId::RealLocation => "real-location-point",
            MarkerId::OriginDraft => "origin-marker",
            MarkerId::DestinationDraft => "destination-marker",
            MarkerId::OriginFixed => "origin-marker-fixed",
            MarkerId::DestinationFixed => "destination-marker-fixed",
        }
    }

    pub fn parse(raw: &str) -> Option<MarkerId> {
        MarkerId::ALL.into_iter().find(|id| id.as_str() == raw)
    }

    pub fn draft(endpoint: Endpoint) -> MarkerId {
        match endpoint {
            Endpoint::Origin => MarkerId::OriginDraft,
            Endpoint::Destination => MarkerId::DestinationDraft,
        }
    }

    pub fn fixed(endpoint: Endpoint) -> MarkerId {
        match endpoint {
            Endpoint::Origin => MarkerId::OriginFixed,
            Endpoint::Destination => MarkerId::DestinationFixed,
        }
    }

    /// Which endpoint a fixed marker stands for. Other kinds aren't clickable.
    pub fn fixed_endpoint(self) -> Option<Endpoint> {
        match self {
            MarkerId::OriginFixed => Some(Endpoint::Origin),
            MarkerId::DestinationFixed => Some(Endpoint::Destination),
            MarkerId::RealLocation | MarkerId::OriginDraft | MarkerId::DestinationDraft => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum IconVariant {
    RealLocation,
    DraftResting,
    // While the map moves underneath it
    DraftLifted,
    OriginFixed,
    DestinationFixed,
}

impl IconVariant {
    pub fn size(self) -> Option<[u32; 2]> {
        match self {
            IconVariant::RealLocation => Some([16, 16]),
            _ => None,
        }
    }

    pub fn anchor(self) -> Option<[u32; 2]> {
        match self {
            IconVariant::OriginFixed | IconVariant::DestinationFixed => Some([20, 67]),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IconVariant::RealLocation => "real-location",
            IconVariant::DraftResting => "draft",
            IconVariant::DraftLifted => "draft-lifted",
            IconVariant::OriginFixed => "origin-fixed",
            IconVariant::DestinationFixed => "destination-fixed",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Origin,
    Destination,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Hash, Debug)]
pub enum PageContext {
    SetOrigin,
    SetDestination,
    /// The ride confirmation page. The map is only looked at here, never edited.
    ConfirmRide,
    Register,
    NoInternet,
    NoGps,
    Other(String),
}

impl PageContext {
    pub fn from_path(path: &str) -> PageContext {
        match path.trim_end_matches('/') {
            // "/" and "/ride" redirect here
            "" | "/ride" | "/ride/setDestination" => PageContext::SetDestination,
            "/ride/setOrigin" => PageContext::SetOrigin,
            "/ride/letsgo" => PageContext::ConfirmRide,
            "/register" => PageContext::Register,
            "/no-internet" => PageContext::NoInternet,
            "/no-gps" => PageContext::NoGps,
            other => PageContext::Other(other.to_string()),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            PageContext::SetOrigin => "/ride/setOrigin",
            PageContext::SetDestination => "/ride/setDestination",
            PageContext::ConfirmRide => "/ride/letsgo",
            PageContext::Register => "/register",
            PageContext::NoInternet => "/no-internet",
            PageContext::NoGps => "/no-gps",
            PageContext::Other(path) => path,
        }
    }

    /// The coordinate store that map interaction edits on this page, if any.
    pub fn editing(&self) -> Option<Endpoint> {
        match self {
            PageContext::SetOrigin => Some(Endpoint::Origin),
            PageContext::SetDestination => Some(Endpoint::Destination),
            _ => None,
        }
    }

    pub fn edit_page(endpoint: Endpoint) -> PageContext {
        match endpoint {
            Endpoint::Origin => PageContext::SetOrigin,
            Endpoint::Destination => PageContext::SetDestination,
        }
    }
}

/// Whether a coordinate update is settled, or just where the map happened to stop.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum UpdateKind {
    #[default]
    Final,
    /// The "void" tag. Downstream consumers shouldn't treat this as the user's choice yet.
    Provisional,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Address {
    pub name: String,
    pub coordinate: Coordinate,
}

// The records below are empty (every field None) rather than absent when no route is shown, so
// display bindings never see a missing object.

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
pub struct Price {
    pub amount: Option<f64>,
    pub currency: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RouteDistance {
    pub km_fixed: Option<String>,
    pub km_full: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
pub struct RouteDuration {
    pub full: Option<String>,
    pub hours: Option<String>,
    pub minutes: Option<String>,
    pub seconds: Option<String>,
}

impl RouteDistance {
    pub fn from_meters(meters: f64) -> Self {
        let km = meters / 1000.0;
        Self {
            km_fixed: Some(format!("{:.1}", km)),
            km_full: Some(km.to_string()),
        }
    }
}

impl RouteDuration {
    pub fn from_seconds(total: u64) -> Self {
        let hours = total / 3600;
        let minutes = (total % 3600) / 60;
        let seconds = total % 60;
        Self {
            full: Some(format!("{:02}:{:02}:{:02}", hours, minutes, seconds)),
            hours: Some(hours.to_string()),
            minutes: Some(minutes.to_string()),
            seconds: Some(seconds.to_string()),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
pub struct RouteSummary {
    pub price: Price,
    pub distance: RouteDistance,
    pub duration: RouteDuration,
}

impl RouteSummary {
    pub fn is_empty(&self) -> bool {
        *self == RouteSummary::default()
    }
}

/// Where the route overlay stands. Only `NotAttempted` lets map movement edit coordinates.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum RouteStatus {
    #[default]
    NotAttempted,
    Installed,
    /// The routing service answered, but had no route between the endpoints
    Unavailable,
}

impl RouteStatus {
    pub fn is_attempted(self) -> bool {
        self != RouteStatus::NotAttempted
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
    pub duration_ms: u64,
}
