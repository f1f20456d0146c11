use serde::{Deserialize, Serialize};
use thiserror::Error;

use serde_json::Error as JsonError;

#[cfg(feature = "wasm")]
use serde_wasm_bindgen::Error as WasmError;

#[cfg(feature = "wasm")]
use wasm_bindgen::JsValue;

/// Every failure the tracking layer can observe.
///
/// None of these are fatal to the hosting page. Callers at the outer edge log them and carry on
/// with tracking disabled (collaborator unavailable), an empty document (malformed document), or
/// nothing at all (write failure, missing DOM target).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum TrackingError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Host environment error: {0}")]
    Host(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Embedded player error: {0}")]
    Player(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Member store error: {0}")]
    Store(String),
}

impl TrackingError {
    /// Collaborator-unavailable errors disable tracking for the page view instead of being
    /// reported to the viewer.
    pub fn disables_tracking(&self) -> bool {
        matches!(
            self,
            TrackingError::Host(_) | TrackingError::Player(_) | TrackingError::Store(_)
        )
    }
}

impl From<JsonError> for TrackingError {
    fn from(src: JsonError) -> TrackingError {
        TrackingError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<toml::de::Error> for TrackingError {
    fn from(src: toml::de::Error) -> TrackingError {
        TrackingError::Config(format!("Toml deserialization error: {src}"))
    }
}

impl From<std::io::Error> for TrackingError {
    fn from(x: std::io::Error) -> Self {
        match x.kind() {
            std::io::ErrorKind::NotFound => TrackingError::NotFound(format!("{x}")),
            _ => TrackingError::Host(format!("IOError: {}", x.kind())),
        }
    }
}

#[cfg(feature = "wasm")]
impl From<WasmError> for TrackingError {
    fn from(wasm_error: WasmError) -> Self {
        TrackingError::Serialization(format!("Serde-wasm-bindgen error: {wasm_error}"))
    }
}

#[cfg(feature = "wasm")]
impl From<JsValue> for TrackingError {
    fn from(value: JsValue) -> Self {
        TrackingError::Host(
            value
                .as_string()
                .unwrap_or_else(|| format!("{value:?}")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_json_maps_to_serialization() {
        let err: TrackingError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, TrackingError::Serialization(_)));
        assert!(!err.disables_tracking());
    }

    #[test]
    fn store_errors_disable_tracking() {
        assert!(TrackingError::Store("offline".into()).disables_tracking());
        assert!(TrackingError::Player("no sdk".into()).disables_tracking());
        assert!(!TrackingError::NotFound("x".into()).disables_tracking());
    }
}
