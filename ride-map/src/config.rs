use serde::Deserialize;

/// Tunables for one app run. Every field has a default, so `{}` is a valid config.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MapConfig {
    pub tile_url: String,
    pub default_zoom: u8,
    pub max_zoom: u8,
    /// How long the map must be still after a drag before the centre is committed
    pub drag_settle_ms: u64,
    pub zoom_settle_ms: u64,
    pub notify_duration_ms: u64,
    pub fallback_error_message: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            tile_url: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            default_zoom: 16,
            max_zoom: 20,
            drag_settle_ms: 800,
            zoom_settle_ms: 0,
            notify_duration_ms: 4000,
            fallback_error_message: "Something went wrong, please try again".to_string(),
        }
    }
}

impl MapConfig {
    pub fn from_json(raw: &str) -> Result<MapConfig, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = MapConfig::from_json(r#"{"dragSettleMs": 500, "maxZoom": 18}"#).unwrap();
        assert_eq!(config.drag_settle_ms, 500);
        assert_eq!(config.max_zoom, 18);
        assert_eq!(config.default_zoom, 16);
        assert_eq!(config.notify_duration_ms, 4000);
    }

    #[test]
    fn bad_config() {
        assert!(MapConfig::from_json(r#"{"dragSettleMs": "soon"}"#).is_err());
    }
}
