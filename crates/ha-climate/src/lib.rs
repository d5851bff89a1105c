//! Climate entities
//!
//! The host-side model a climate integration implements: the [`Entity`]
//! lifecycle, the [`ClimateEntity`] property/command set, HVAC modes and the
//! state snapshot published to the host.

pub mod climate;
pub mod entity;
mod state;

pub use climate::{
    ClimateEntity, ClimateEntityFeature, HvacMode, DEFAULT_MAX_TEMP, DEFAULT_MIN_TEMP, PRESET_BOOST,
    PRESET_COMFORT, PRESET_ECO, SWING_BOTH, SWING_HORIZONTAL, SWING_OFF, SWING_VERTICAL,
    UNIT_CELSIUS,
};
pub use entity::{Entity, EntityError, EntityResult};
pub use state::{ClimateState, STATE_UNAVAILABLE, STATE_UNKNOWN};
