//! Climate platform types

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityError, EntityResult};

pub const UNIT_CELSIUS: &str = "°C";

pub const DEFAULT_MIN_TEMP: f64 = 7.0;
pub const DEFAULT_MAX_TEMP: f64 = 35.0;

pub const SWING_OFF: &str = "off";
pub const SWING_BOTH: &str = "both";
pub const SWING_VERTICAL: &str = "vertical";
pub const SWING_HORIZONTAL: &str = "horizontal";

pub const PRESET_ECO: &str = "eco";
pub const PRESET_COMFORT: &str = "comfort";
pub const PRESET_BOOST: &str = "boost";

/// Operating mode of an HVAC device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    HeatCool,
    Auto,
    Dry,
    FanOnly,
}

impl HvacMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HvacMode::Off => "off",
            HvacMode::Heat => "heat",
            HvacMode::Cool => "cool",
            HvacMode::HeatCool => "heat_cool",
            HvacMode::Auto => "auto",
            HvacMode::Dry => "dry",
            HvacMode::FanOnly => "fan_only",
        }
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HvacMode {
    type Err = EntityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "off" => HvacMode::Off,
            "heat" => HvacMode::Heat,
            "cool" => HvacMode::Cool,
            "heat_cool" => HvacMode::HeatCool,
            "auto" => HvacMode::Auto,
            "dry" => HvacMode::Dry,
            "fan_only" => HvacMode::FanOnly,
            other => {
                return Err(EntityError::InvalidValue {
                    field: "hvac_mode",
                    value: other.to_string(),
                })
            }
        })
    }
}

bitflags::bitflags! {
    /// Bit set of optional climate capabilities
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClimateEntityFeature: u32 {
        const TARGET_TEMPERATURE = 1;
        const TARGET_TEMPERATURE_RANGE = 1 << 1;
        const TARGET_HUMIDITY = 1 << 2;
        const FAN_MODE = 1 << 3;
        const PRESET_MODE = 1 << 4;
        const SWING_MODE = 1 << 5;
    }
}

/// Properties and commands of a climate device
///
/// Optional capabilities default to "not supported"; implementors advertise
/// what they handle through [`ClimateEntity::supported_features`].
#[async_trait]
pub trait ClimateEntity: Entity {
    fn temperature_unit(&self) -> &'static str {
        UNIT_CELSIUS
    }

    fn supported_features(&self) -> ClimateEntityFeature;

    fn current_temperature(&self) -> Option<f64>;

    fn target_temperature(&self) -> Option<f64>;

    fn target_temperature_step(&self) -> Option<f64> {
        None
    }

    fn min_temp(&self) -> f64 {
        DEFAULT_MIN_TEMP
    }

    fn max_temp(&self) -> f64 {
        DEFAULT_MAX_TEMP
    }

    fn hvac_mode(&self) -> Option<HvacMode>;

    fn hvac_modes(&self) -> Vec<HvacMode>;

    fn preset_mode(&self) -> Option<String> {
        None
    }

    fn preset_modes(&self) -> Vec<String> {
        Vec::new()
    }

    fn fan_mode(&self) -> Option<String> {
        None
    }

    fn fan_modes(&self) -> Vec<String> {
        Vec::new()
    }

    fn swing_mode(&self) -> Option<String> {
        None
    }

    fn swing_modes(&self) -> Vec<String> {
        Vec::new()
    }

    /// Set the target temperature, switching mode first when one is given
    async fn async_set_temperature(
        &self,
        temperature: Option<f64>,
        hvac_mode: Option<HvacMode>,
    ) -> EntityResult<()>;

    async fn async_set_hvac_mode(&self, hvac_mode: HvacMode) -> EntityResult<()>;

    async fn async_set_fan_mode(&self, _fan_mode: &str) -> EntityResult<()> {
        Err(EntityError::NotSupported("fan_mode"))
    }

    async fn async_set_swing_mode(&self, _swing_mode: &str) -> EntityResult<()> {
        Err(EntityError::NotSupported("swing_mode"))
    }

    async fn async_set_preset_mode(&self, _preset_mode: &str) -> EntityResult<()> {
        Err(EntityError::NotSupported("preset_mode"))
    }
}
