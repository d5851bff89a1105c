//! State snapshot of a climate entity

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::climate::{ClimateEntity, ClimateEntityFeature};

pub const STATE_UNAVAILABLE: &str = "unavailable";
pub const STATE_UNKNOWN: &str = "unknown";

/// What the host stores for a climate entity: the HVAC mode as state value
/// plus the climate attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClimateState {
    pub state: String,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ClimateState {
    /// Capture the current properties of an entity
    pub fn capture<E: ClimateEntity + ?Sized>(entity: &E) -> Self {
        let features = entity.supported_features();
        let mut attributes = HashMap::new();

        attributes.insert("hvac_modes".to_string(), json!(entity.hvac_modes()));
        attributes.insert("min_temp".to_string(), json!(entity.min_temp()));
        attributes.insert("max_temp".to_string(), json!(entity.max_temp()));
        attributes.insert(
            "current_temperature".to_string(),
            json!(entity.current_temperature()),
        );
        attributes.insert(
            "temperature".to_string(),
            json!(entity.target_temperature()),
        );
        attributes.insert("supported_features".to_string(), json!(features.bits()));
        if let Some(step) = entity.target_temperature_step() {
            attributes.insert("target_temp_step".to_string(), json!(step));
        }
        if features.contains(ClimateEntityFeature::FAN_MODE) {
            attributes.insert("fan_modes".to_string(), json!(entity.fan_modes()));
            attributes.insert("fan_mode".to_string(), json!(entity.fan_mode()));
        }
        if features.contains(ClimateEntityFeature::PRESET_MODE) {
            attributes.insert("preset_modes".to_string(), json!(entity.preset_modes()));
            attributes.insert("preset_mode".to_string(), json!(entity.preset_mode()));
        }
        if features.contains(ClimateEntityFeature::SWING_MODE) {
            attributes.insert("swing_modes".to_string(), json!(entity.swing_modes()));
            attributes.insert("swing_mode".to_string(), json!(entity.swing_mode()));
        }
        if let Some(name) = entity.name() {
            attributes.insert("friendly_name".to_string(), json!(name));
        }
        if let Some(icon) = entity.icon() {
            attributes.insert("icon".to_string(), json!(icon));
        }
        attributes.extend(entity.extra_state_attributes());

        let state = if !entity.available() {
            STATE_UNAVAILABLE.to_string()
        } else {
            entity
                .hvac_mode()
                .map(|mode| mode.as_str().to_string())
                .unwrap_or_else(|| STATE_UNKNOWN.to_string())
        };

        Self { state, attributes }
    }

    pub fn is_unavailable(&self) -> bool {
        self.state == STATE_UNAVAILABLE
    }

    /// Get an attribute value by key
    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}
