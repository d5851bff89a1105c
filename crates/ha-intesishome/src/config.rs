//! Connection settings and form schemas
//!
//! The same [`IntesisConfig`] shape is used for static YAML configuration,
//! for config flow input and for the data persisted in the config entry.

use ha_config_entries::{FlowInput, FormField};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{DeviceType, CONF_DEVICE, CONF_HOST, CONF_PASSWORD, CONF_USERNAME};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("'{field}' is required for {device}")]
    MissingField {
        field: &'static str,
        device: DeviceType,
    },

    #[error("unsupported device type '{0}'")]
    UnknownDevice(String),

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Device type plus whichever credentials that type needs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IntesisConfig {
    #[serde(default)]
    pub device: DeviceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Validated credentials for one connection backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    /// Vendor cloud account
    Cloud {
        device_type: DeviceType,
        username: String,
        password: String,
    },
    /// IntesisBox WMP socket
    LocalSocket { host: String },
    /// IntesisHome local HTTP API
    LocalApi {
        host: String,
        username: String,
        password: String,
    },
}

impl IntesisConfig {
    /// Parse a platform entry from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse submitted form fields or stored entry data
    pub fn from_input(input: &FlowInput) -> Result<Self, ConfigError> {
        let object: serde_json::Map<String, serde_json::Value> =
            input.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Ok(serde_json::from_value(serde_json::Value::Object(object))?)
    }

    /// Serialize into entry data
    pub fn to_data(&self) -> FlowInput {
        let mut data = FlowInput::new();
        data.insert(CONF_DEVICE.to_string(), self.device.as_str().into());
        for (key, value) in [
            (CONF_HOST, &self.host),
            (CONF_USERNAME, &self.username),
            (CONF_PASSWORD, &self.password),
        ] {
            if let Some(value) = value {
                data.insert(key.to_string(), value.as_str().into());
            }
        }
        data
    }

    /// Check that the fields required by the device type are present
    pub fn connection(&self) -> Result<Connection, ConfigError> {
        let device = self.device;
        let required = |value: &Option<String>, field: &'static str| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or(ConfigError::MissingField { field, device })
        };

        Ok(match device {
            DeviceType::IntesisBox => Connection::LocalSocket {
                host: required(&self.host, CONF_HOST)?,
            },
            DeviceType::IntesisHomeLocal => Connection::LocalApi {
                host: required(&self.host, CONF_HOST)?,
                username: required(&self.username, CONF_USERNAME)?,
                password: required(&self.password, CONF_PASSWORD)?,
            },
            DeviceType::IntesisHome | DeviceType::AirconWithMe | DeviceType::Anywair => {
                Connection::Cloud {
                    device_type: device,
                    username: required(&self.username, CONF_USERNAME)?,
                    password: required(&self.password, CONF_PASSWORD)?,
                }
            }
        })
    }
}

impl Connection {
    pub fn device_type(&self) -> DeviceType {
        match self {
            Connection::Cloud { device_type, .. } => *device_type,
            Connection::LocalSocket { .. } => DeviceType::IntesisBox,
            Connection::LocalApi { .. } => DeviceType::IntesisHomeLocal,
        }
    }

    /// The config holding exactly this backend's fields
    pub fn to_config(&self) -> IntesisConfig {
        match self.clone() {
            Connection::Cloud {
                device_type,
                username,
                password,
            } => IntesisConfig {
                device: device_type,
                host: None,
                username: Some(username),
                password: Some(password),
            },
            Connection::LocalSocket { host } => IntesisConfig {
                device: DeviceType::IntesisBox,
                host: Some(host),
                username: None,
                password: None,
            },
            Connection::LocalApi {
                host,
                username,
                password,
            } => IntesisConfig {
                device: DeviceType::IntesisHomeLocal,
                host: Some(host),
                username: Some(username),
                password: Some(password),
            },
        }
    }
}

/// Schema of the device type selection step
pub fn user_schema() -> Vec<FormField> {
    vec![FormField::select(
        CONF_DEVICE,
        DeviceType::FLOW_TYPES.iter().map(DeviceType::as_str),
        Some(DeviceType::IntesisHome.as_str()),
    )]
}

/// Schema of the credentials step for the chosen device type
pub fn details_schema(device_type: DeviceType) -> Vec<FormField> {
    let default = Some(device_type.as_str());
    match device_type {
        DeviceType::IntesisBox => vec![
            FormField::select(CONF_DEVICE, ["IntesisBox", "intesishome_local"], default),
            FormField::string(CONF_HOST),
        ],
        DeviceType::IntesisHomeLocal => vec![
            FormField::select(CONF_DEVICE, ["IntesisBox", "intesishome_local"], default),
            FormField::string(CONF_HOST),
            FormField::string(CONF_USERNAME),
            FormField::string(CONF_PASSWORD),
        ],
        DeviceType::IntesisHome | DeviceType::AirconWithMe | DeviceType::Anywair => vec![
            FormField::select(CONF_DEVICE, ["airconwithme", "IntesisHome"], default),
            FormField::string(CONF_USERNAME),
            FormField::string(CONF_PASSWORD),
        ],
    }
}
