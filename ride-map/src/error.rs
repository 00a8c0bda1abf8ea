use thiserror::Error;

/// Failures inside the engine. `StaleReference` and `Cancelled` are expected during normal use
/// (a page changed, a session was destroyed under an in-flight request) and get dropped at the
/// `RideMap` boundary.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("map container unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("stale reference: {0}")]
    StaleReference(&'static str),

    #[error("upstream failure: {0}")]
    UpstreamFailure(#[from] UpstreamError),

    #[error("cancelled: the page changed")]
    Cancelled,
}

impl MapError {
    pub fn is_benign(&self) -> bool {
        matches!(self, MapError::StaleReference(_) | MapError::Cancelled)
    }
}

impl From<CanvasError> for MapError {
    fn from(err: CanvasError) -> Self {
        match err {
            CanvasError::NoSuchContainer(_) | CanvasError::ContainerBound(_) => {
                MapError::ResourceUnavailable(err.to_string())
            }
            CanvasError::NoSuchView | CanvasError::NoSuchLayer | CanvasError::NoSuchListener => {
                MapError::StaleReference("map widget object is gone")
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CanvasError {
    #[error("no container with id {0}")]
    NoSuchContainer(String),

    #[error("container {0} is already bound to a live map")]
    ContainerBound(String),

    #[error("the map view was removed")]
    NoSuchView,

    #[error("the layer was removed")]
    NoSuchLayer,

    #[error("the listener was detached")]
    NoSuchListener,
}

/// An error reported by geocoding, routing or location collaborators. The message is what the
/// user gets to see.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{message}")]
pub struct UpstreamError {
    pub message: String,
}

impl UpstreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
