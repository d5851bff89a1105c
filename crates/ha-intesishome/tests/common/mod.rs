//! Common test utilities for the IntesisHome integration
//!
//! A scripted stand-in for the vendor library plus a small host harness
//! with config entries, config flows and the integration registered.

#![allow(dead_code)]
#![allow(unused_imports)]

mod fixtures;
mod mock_controller;
mod test_hass;

pub use fixtures::*;
pub use mock_controller::*;
pub use test_hass::*;
