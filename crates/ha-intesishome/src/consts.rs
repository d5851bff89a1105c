//! Integration constants and device types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

pub const DOMAIN: &str = "intesishome";

pub const CONF_DEVICE: &str = "device";
pub const CONF_HOST: &str = "host";
pub const CONF_USERNAME: &str = "username";
pub const CONF_PASSWORD: &str = "password";

pub const STEP_USER: &str = "user";
pub const STEP_DETAILS: &str = "details";
pub const STEP_IMPORT: &str = "import";

/// Form error codes, attached to the `base` key
pub const ERROR_INVALID_AUTH: &str = "invalid_auth";
pub const ERROR_CANNOT_CONNECT: &str = "cannot_connect";
pub const ERROR_NO_DEVICES: &str = "no_devices";
pub const ERROR_UNKNOWN: &str = "unknown";

/// Controller families reachable through the vendor library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceType {
    /// IntesisHome cloud API
    #[default]
    #[serde(rename = "IntesisHome")]
    IntesisHome,
    /// airconwithme cloud API
    #[serde(rename = "airconwithme")]
    AirconWithMe,
    /// anywAiR cloud API (static configuration only)
    #[serde(rename = "anywair")]
    Anywair,
    /// IntesisBox WMP socket on the local network
    #[serde(rename = "IntesisBox")]
    IntesisBox,
    /// IntesisHome local HTTP API
    #[serde(rename = "intesishome_local")]
    IntesisHomeLocal,
}

impl DeviceType {
    /// Device types offered by the setup wizard
    pub const FLOW_TYPES: [DeviceType; 4] = [
        DeviceType::AirconWithMe,
        DeviceType::IntesisHome,
        DeviceType::IntesisBox,
        DeviceType::IntesisHomeLocal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::IntesisHome => "IntesisHome",
            DeviceType::AirconWithMe => "airconwithme",
            DeviceType::Anywair => "anywair",
            DeviceType::IntesisBox => "IntesisBox",
            DeviceType::IntesisHomeLocal => "intesishome_local",
        }
    }

    pub fn is_cloud(&self) -> bool {
        matches!(
            self,
            DeviceType::IntesisHome | DeviceType::AirconWithMe | DeviceType::Anywair
        )
    }

    /// IntesisBox sockets are connected when the controller is built; the
    /// HTTP-based variants need an explicit connect before push updates flow.
    pub fn requires_connect(&self) -> bool {
        *self != DeviceType::IntesisBox
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            DeviceType::IntesisHome,
            DeviceType::AirconWithMe,
            DeviceType::Anywair,
            DeviceType::IntesisBox,
            DeviceType::IntesisHomeLocal,
        ]
        .into_iter()
        .find(|d| d.as_str() == s)
        .ok_or_else(|| ConfigError::UnknownDevice(s.to_string()))
    }
}
