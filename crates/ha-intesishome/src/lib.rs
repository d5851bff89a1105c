//! IntesisHome integration
//!
//! Exposes IntesisHome, airconwithme, anywAiR and IntesisBox air-conditioning
//! units as climate entities. The vendor library that talks to the units is
//! reached through [`IntesisController`]; a [`ControllerFactory`] builds one
//! controller per configured [`Connection`].

pub mod climate;
pub mod config;
pub mod config_flow;
pub mod consts;
pub mod controller;
pub mod device;
pub mod setup;

pub use climate::IntesisAc;
pub use config::{ConfigError, Connection, IntesisConfig};
pub use config_flow::IntesisConfigFlow;
pub use consts::{DeviceType, DOMAIN};
pub use controller::{
    start_controller, ConnectFailure, ControllerError, ControllerFactory, ControllerResult,
    IntesisController, UpdateListener,
};
pub use device::DeviceRecord;
pub use setup::{IntesisData, IntesisHome};
