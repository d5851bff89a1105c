//! Raw device records reported by a controller

use serde::{Deserialize, Serialize};

/// Vendor fields of one air-conditioning unit.
///
/// Values are kept as the vendor library reports them; translation into
/// climate-entity terms happens in the climate platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub name: Option<String>,
    /// "on" or "off"
    pub power: Option<String>,
    /// Vendor mode string: auto, cool, dry, fan, heat
    pub mode: Option<String>,
    pub setpoint: Option<f64>,
    pub temperature: Option<f64>,
    pub setpoint_min: Option<f64>,
    pub setpoint_max: Option<f64>,
    pub fan_speed: Option<String>,
    /// Vertical vane position, "swing" while oscillating
    pub vvane: Option<String>,
    /// Horizontal vane position, "swing" while oscillating
    pub hvane: Option<String>,
    /// Vendor preset: eco, comfort, powerful
    pub preset: Option<String>,
    pub outdoor_temp: Option<f64>,
    pub rssi: Option<i64>,
    pub run_hours: Option<u64>,
    /// Watts
    pub power_consumption_heat: Option<f64>,
    /// Watts
    pub power_consumption_cool: Option<f64>,
    /// Fields this integration does not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DeviceRecord {
    pub fn is_on(&self) -> bool {
        self.power.as_deref() == Some("on")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_partial_record() {
        let record: DeviceRecord = serde_json::from_value(json!({
            "name": "Bedroom",
            "power": "on",
            "mode": "cool",
            "setpoint": 23.5,
            "widget_version": 4
        }))
        .unwrap();

        assert_eq!(record.name.as_deref(), Some("Bedroom"));
        assert!(record.is_on());
        assert_eq!(record.setpoint, Some(23.5));
        assert!(record.temperature.is_none());
        assert_eq!(record.extra.get("widget_version"), Some(&json!(4)));
    }
}
