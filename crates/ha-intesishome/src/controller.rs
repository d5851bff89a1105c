//! Seam to the vendor device-control library
//!
//! A controller is a live session to one IntesisHome account, one local
//! IntesisHome gateway or one IntesisBox. Network I/O, sessions and protocol
//! framing all live behind [`IntesisController`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::config::Connection;
use crate::consts::DeviceType;
use crate::device::DeviceRecord;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ControllerResult<T> = Result<T, ControllerError>;

/// Receives push updates from a controller.
///
/// Controllers may call this once per changed field or once per batch;
/// `device_id` is `None` when the change is not tied to a single device
/// (e.g. connection state).
pub trait UpdateListener: Send + Sync {
    fn on_update(&self, device_id: Option<&str>);
}

#[async_trait]
pub trait IntesisController: Send + Sync {
    fn device_type(&self) -> DeviceType;

    /// Account or gateway identifier, stable across restarts
    fn controller_id(&self) -> String;

    fn name(&self) -> String;

    fn is_connected(&self) -> bool;

    /// Last error reported by the vendor API
    fn error_message(&self) -> Option<String>;

    fn get_devices(&self) -> HashMap<String, DeviceRecord>;

    fn get_device(&self, device_id: &str) -> Option<DeviceRecord> {
        self.get_devices().remove(device_id)
    }

    fn has_vertical_swing(&self, device_id: &str) -> bool;

    fn has_horizontal_swing(&self, device_id: &str) -> bool;

    fn get_fan_speed_list(&self, device_id: &str) -> Vec<String>;

    /// Vendor mode strings the unit accepts
    fn get_mode_list(&self, device_id: &str) -> Vec<String>;

    fn add_update_callback(&self, listener: Arc<dyn UpdateListener>);

    async fn connect(&self) -> ControllerResult<()>;

    async fn poll_status(&self) -> ControllerResult<()>;

    async fn stop(&self) -> ControllerResult<()>;

    async fn set_temperature(&self, device_id: &str, setpoint: f64) -> ControllerResult<()>;

    async fn set_power_off(&self, device_id: &str) -> ControllerResult<()>;

    /// Power the unit on in the given vendor mode
    async fn set_mode(&self, device_id: &str, mode: &str) -> ControllerResult<()>;

    async fn set_fan_speed(&self, device_id: &str, fan_speed: &str) -> ControllerResult<()>;

    async fn set_vertical_vane(&self, device_id: &str, position: &str) -> ControllerResult<()>;

    async fn set_horizontal_vane(&self, device_id: &str, position: &str)
        -> ControllerResult<()>;

    async fn set_preset_mode(&self, device_id: &str, preset: &str) -> ControllerResult<()>;
}

/// Builds a controller for a connection backend
pub trait ControllerFactory: Send + Sync {
    fn create(&self, connection: &Connection) -> ControllerResult<Arc<dyn IntesisController>>;
}

/// Why opening a controller session failed
#[derive(Debug, Error)]
pub enum ConnectFailure {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("cannot connect: {0}")]
    Connection(String),

    /// The session opened but reported no units
    #[error("no devices found: {}", .0.as_deref().unwrap_or("empty device list"))]
    NoDevices(Option<String>),

    #[error(transparent)]
    Unclassified(anyhow::Error),
}

impl ConnectFailure {
    /// Form error code shown for this failure
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectFailure::Authentication(_) => crate::consts::ERROR_INVALID_AUTH,
            ConnectFailure::Connection(_) => crate::consts::ERROR_CANNOT_CONNECT,
            ConnectFailure::NoDevices(_) => crate::consts::ERROR_NO_DEVICES,
            ConnectFailure::Unclassified(_) => crate::consts::ERROR_UNKNOWN,
        }
    }
}

impl From<ControllerError> for ConnectFailure {
    fn from(err: ControllerError) -> Self {
        match err {
            ControllerError::Authentication(reason) => ConnectFailure::Authentication(reason),
            ControllerError::Connection(reason) => ConnectFailure::Connection(reason),
            ControllerError::Other(err) => ConnectFailure::Unclassified(err),
        }
    }
}

/// Build a controller and check that it reaches at least one unit.
///
/// IntesisBox sockets connect; every other backend polls status once.
/// The controller is stopped again when the attempt fails.
pub async fn start_controller(
    factory: &dyn ControllerFactory,
    connection: &Connection,
) -> Result<Arc<dyn IntesisController>, ConnectFailure> {
    let controller = factory.create(connection)?;

    let opened = if connection.device_type() == DeviceType::IntesisBox {
        controller.connect().await
    } else {
        controller.poll_status().await
    };

    let failure = match opened {
        Ok(()) if !controller.get_devices().is_empty() => return Ok(controller),
        Ok(()) => ConnectFailure::NoDevices(controller.error_message()),
        Err(err) => err.into(),
    };

    if let Err(err) = controller.stop().await {
        debug!(
            "Error stopping {} controller: {}",
            connection.device_type(),
            err
        );
    }
    Err(failure)
}
