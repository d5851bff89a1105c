//! Entry and platform setup
//!
//! [`IntesisHome`] ties the integration into the host: it hands out config
//! flows, sets up config entries and builds the climate entities for a
//! controller. Controllers opened by a finished flow are parked in
//! [`IntesisData`] until the entry created by that flow is set up.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ha_climate::{Entity, EntityError};
use ha_config_entries::{
    ConfigEntries, ConfigEntry, ConfigEntrySource, ConfigFlow, FlowError, FlowFactory, FlowManager,
    FlowResult, SetupError, SetupHandler,
};
use tracing::{debug, error, info, warn};

use crate::climate::IntesisAc;
use crate::config::IntesisConfig;
use crate::config_flow::IntesisConfigFlow;
use crate::consts::DOMAIN;
use crate::controller::{start_controller, ConnectFailure, ControllerFactory, IntesisController};

/// Runtime data of the integration
#[derive(Default)]
pub struct IntesisData {
    controllers: DashMap<String, Arc<dyn IntesisController>>,
    entities: DashMap<String, Vec<Arc<IntesisAc>>>,
}

impl IntesisData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a validated controller under the entry's unique id
    pub fn store_controller(&self, unique_id: &str, controller: Arc<dyn IntesisController>) {
        self.controllers.insert(unique_id.to_string(), controller);
    }

    pub fn take_controller(&self, unique_id: &str) -> Option<Arc<dyn IntesisController>> {
        self.controllers
            .remove(unique_id)
            .map(|(_, controller)| controller)
    }

    pub fn has_controller(&self, unique_id: &str) -> bool {
        self.controllers.contains_key(unique_id)
    }

    /// Entities set up for an entry
    pub fn entities(&self, entry_id: &str) -> Vec<Arc<IntesisAc>> {
        self.entities
            .get(entry_id)
            .map(|entities| entities.value().clone())
            .unwrap_or_default()
    }

    fn insert_entities(&self, entry_id: &str, entities: Vec<Arc<IntesisAc>>) {
        self.entities.insert(entry_id.to_string(), entities);
    }

    fn remove_entities(&self, entry_id: &str) -> Vec<Arc<IntesisAc>> {
        self.entities
            .remove(entry_id)
            .map(|(_, entities)| entities)
            .unwrap_or_default()
    }
}

/// The IntesisHome integration
pub struct IntesisHome {
    data: Arc<IntesisData>,
    factory: Arc<dyn ControllerFactory>,
}

impl IntesisHome {
    pub fn new(factory: Arc<dyn ControllerFactory>) -> Arc<Self> {
        Arc::new(Self {
            data: Arc::new(IntesisData::new()),
            factory,
        })
    }

    pub fn data(&self) -> &Arc<IntesisData> {
        &self.data
    }

    pub fn flow_factory(&self) -> FlowFactory {
        let data = Arc::clone(&self.data);
        let factory = Arc::clone(&self.factory);
        Arc::new(move || -> Box<dyn ConfigFlow> {
            Box::new(IntesisConfigFlow::new(
                Arc::clone(&data),
                Arc::clone(&factory),
            ))
        })
    }

    /// Register the setup handler and the config flow with the host
    pub fn register(self: &Arc<Self>, entries: &ConfigEntries, flows: &FlowManager) {
        entries.register_setup_handler(DOMAIN, Arc::clone(self) as Arc<dyn SetupHandler>);
        flows.register_flow(DOMAIN, self.flow_factory());
    }

    /// Turn a static configuration into a config entry
    pub async fn async_import(
        &self,
        flows: &FlowManager,
        config: &IntesisConfig,
    ) -> Result<FlowResult, FlowError> {
        flows
            .start_flow(DOMAIN, ConfigEntrySource::Import, Some(config.to_data()))
            .await
    }

    /// Set up entities straight from a static configuration.
    ///
    /// Bad credentials and empty accounts are logged and yield no entities;
    /// an unreachable controller is reported as not ready.
    pub async fn setup_platform(
        &self,
        config: &IntesisConfig,
    ) -> Result<Vec<Arc<IntesisAc>>, SetupError> {
        let connection = config
            .connection()
            .map_err(|err| SetupError::Failed(err.to_string()))?;
        let device_type = connection.device_type();

        let controller = match start_controller(self.factory.as_ref(), &connection).await {
            Ok(controller) => controller,
            Err(ConnectFailure::Authentication(reason)) => {
                error!("Error authenticating with {}: {}", device_type, reason);
                return Ok(Vec::new());
            }
            Err(ConnectFailure::Connection(reason)) => {
                error!("Error connecting to the {} server: {}", device_type, reason);
                return Err(SetupError::NotReady(reason));
            }
            Err(ConnectFailure::NoDevices(message)) => {
                error!(
                    "Error getting device list from {} API: {}",
                    device_type,
                    message.unwrap_or_default()
                );
                return Ok(Vec::new());
            }
            Err(ConnectFailure::Unclassified(err)) => {
                return Err(SetupError::Failed(format!("{err:#}")));
            }
        };

        self.add_entities(controller).await
    }

    /// One entity per device, refreshed and then attached
    async fn add_entities(
        &self,
        controller: Arc<dyn IntesisController>,
    ) -> Result<Vec<Arc<IntesisAc>>, SetupError> {
        let mut devices: Vec<_> = controller.get_devices().into_iter().collect();
        devices.sort_by(|a, b| a.0.cmp(&b.0));

        let entities: Vec<_> = devices
            .iter()
            .map(|(device_id, record)| {
                IntesisAc::new(device_id.as_str(), record, Arc::clone(&controller))
            })
            .collect();

        for entity in &entities {
            let attached = match entity.async_update().await {
                Ok(()) => entity.async_added_to_hass().await,
                Err(err) => Err(err),
            };
            if let Err(err) = attached {
                if let Err(stop_err) = controller.stop().await {
                    debug!(
                        "Error stopping {} controller: {}",
                        controller.device_type(),
                        stop_err
                    );
                }
                return Err(setup_error(err));
            }
        }

        debug!(
            "Added {} {} entities",
            entities.len(),
            controller.device_type()
        );
        Ok(entities)
    }
}

fn setup_error(err: EntityError) -> SetupError {
    match err {
        EntityError::PlatformNotReady(reason) => SetupError::NotReady(reason),
        other => SetupError::Failed(other.to_string()),
    }
}

#[async_trait]
impl SetupHandler for IntesisHome {
    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<(), SetupError> {
        let stored = entry
            .unique_id
            .as_deref()
            .and_then(|unique_id| self.data.take_controller(unique_id));

        let controller = match stored {
            Some(controller) => controller,
            None => {
                debug!("Rebuilding controller for entry {}", entry.entry_id);
                let connection = IntesisConfig::from_input(&entry.data)
                    .and_then(|config| config.connection())
                    .map_err(|err| SetupError::Failed(err.to_string()))?;

                match start_controller(self.factory.as_ref(), &connection).await {
                    Ok(controller) => controller,
                    Err(ConnectFailure::Connection(reason)) => {
                        return Err(SetupError::NotReady(reason))
                    }
                    Err(failure) => return Err(SetupError::Failed(failure.to_string())),
                }
            }
        };

        let entities = self.add_entities(controller).await?;
        info!(
            "Set up {} climate entities for {}",
            entities.len(),
            entry.title
        );
        self.data.insert_entities(&entry.entry_id, entities);
        Ok(())
    }

    async fn unload_entry(&self, entry: &ConfigEntry) -> Result<(), SetupError> {
        for entity in self.data.remove_entities(&entry.entry_id) {
            if let Err(err) = entity.async_will_remove_from_hass().await {
                warn!("Error removing {}: {}", entity.device_id(), err);
            }
        }
        Ok(())
    }
}
