//! Config flow for IntesisHome
//!
//! `user` picks the device type, `details` collects the credentials for
//! that type and opens a controller session to validate them. Imports from
//! static configuration enter at `user` with the full mapping and go
//! through the same checks without a form round-trip.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ha_config_entries::{ConfigFlow, FlowContext, FlowError, FlowInput, FlowResult};
use tracing::{debug, error};

use crate::config::{details_schema, user_schema, IntesisConfig};
use crate::consts::{
    DeviceType, CONF_DEVICE, CONF_HOST, CONF_PASSWORD, CONF_USERNAME, STEP_DETAILS, STEP_IMPORT,
    STEP_USER,
};
use crate::controller::{start_controller, ConnectFailure, ControllerFactory};
use crate::setup::IntesisData;

pub struct IntesisConfigFlow {
    data: Arc<IntesisData>,
    factory: Arc<dyn ControllerFactory>,
    device_type: DeviceType,
    /// Unique id of the controller parked for the entry being created
    parked: Option<String>,
}

impl IntesisConfigFlow {
    pub fn new(data: Arc<IntesisData>, factory: Arc<dyn ControllerFactory>) -> Self {
        Self {
            data,
            factory,
            device_type: DeviceType::default(),
            parked: None,
        }
    }

    async fn async_step_user(
        &mut self,
        ctx: &mut FlowContext,
        user_input: Option<FlowInput>,
    ) -> Result<FlowResult, FlowError> {
        let Some(input) = user_input else {
            return Ok(FlowResult::form(STEP_USER, user_schema(), HashMap::new()));
        };

        self.device_type = flow_device_type(&input)?;

        let has_connection = [CONF_HOST, CONF_USERNAME, CONF_PASSWORD]
            .iter()
            .any(|key| input.contains_key(*key));
        if has_connection {
            return self.async_step_details(ctx, Some(input)).await;
        }

        Ok(FlowResult::form(
            STEP_DETAILS,
            details_schema(self.device_type),
            HashMap::new(),
        ))
    }

    async fn async_step_details(
        &mut self,
        ctx: &mut FlowContext,
        user_input: Option<FlowInput>,
    ) -> Result<FlowResult, FlowError> {
        let Some(input) = user_input else {
            return Ok(FlowResult::form(
                STEP_DETAILS,
                details_schema(self.device_type),
                HashMap::new(),
            ));
        };

        self.device_type = flow_device_type(&input)?;
        let connection = IntesisConfig::from_input(&input)
            .and_then(|config| config.connection())
            .map_err(|err| FlowError::InvalidInput(err.to_string()))?;

        let controller = match start_controller(self.factory.as_ref(), &connection).await {
            Ok(controller) => controller,
            Err(failure) => {
                match failure {
                    ConnectFailure::Unclassified(ref err) => {
                        error!("Unexpected exception: {:?}", err)
                    }
                    ref other => debug!("Validation of {} failed: {}", self.device_type, other),
                }
                let mut errors = HashMap::new();
                errors.insert("base".to_string(), failure.error_code().to_string());
                return Ok(FlowResult::form(
                    STEP_DETAILS,
                    details_schema(self.device_type),
                    errors,
                ));
            }
        };

        let device_type = controller.device_type();
        let unique_id = format!("{}_{}", device_type, controller.controller_id()).to_lowercase();
        ctx.set_unique_id(unique_id.as_str());

        if let Err(abort) = ctx.abort_if_unique_id_configured() {
            if let Err(err) = controller.stop().await {
                debug!("Error stopping {} controller: {}", device_type, err);
            }
            return Err(abort);
        }

        let title = format!("{} {}", device_type, controller.name());
        self.data.store_controller(&unique_id, controller);
        self.parked = Some(unique_id);

        Ok(FlowResult::create_entry(
            title,
            connection.to_config().to_data(),
        ))
    }

    async fn async_step_import(
        &mut self,
        ctx: &mut FlowContext,
        user_input: Option<FlowInput>,
    ) -> Result<FlowResult, FlowError> {
        self.async_step_user(ctx, user_input).await
    }
}

#[async_trait]
impl ConfigFlow for IntesisConfigFlow {
    async fn async_step(
        &mut self,
        ctx: &mut FlowContext,
        step_id: &str,
        user_input: Option<FlowInput>,
    ) -> Result<FlowResult, FlowError> {
        match step_id {
            STEP_USER => self.async_step_user(ctx, user_input).await,
            STEP_DETAILS => self.async_step_details(ctx, user_input).await,
            STEP_IMPORT => self.async_step_import(ctx, user_input).await,
            other => Err(FlowError::UnknownStep(other.to_string())),
        }
    }

    /// Stop the parked controller when no entry claimed it
    async fn async_remove(&mut self) {
        let Some(unique_id) = self.parked.take() else {
            return;
        };
        if let Some(controller) = self.data.take_controller(&unique_id) {
            debug!("Stopping unclaimed controller {}", unique_id);
            if let Err(err) = controller.stop().await {
                debug!(
                    "Error stopping {} controller: {}",
                    controller.device_type(),
                    err
                );
            }
        }
    }
}

/// The submitted device type, restricted to the types the wizard offers
fn flow_device_type(input: &FlowInput) -> Result<DeviceType, FlowError> {
    let device = input
        .get(CONF_DEVICE)
        .and_then(|value| value.as_str())
        .ok_or_else(|| FlowError::InvalidInput(format!("'{CONF_DEVICE}' is required")))?;
    let device_type: DeviceType = device
        .parse()
        .map_err(|err: crate::config::ConfigError| FlowError::InvalidInput(err.to_string()))?;

    if DeviceType::FLOW_TYPES.contains(&device_type) {
        Ok(device_type)
    } else {
        Err(FlowError::InvalidInput(format!(
            "{device_type} cannot be set up from the UI"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(pairs: &[(&str, &str)]) -> FlowInput {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[test]
    fn test_flow_device_type() {
        assert_eq!(
            flow_device_type(&input(&[("device", "intesishome_local")])).unwrap(),
            DeviceType::IntesisHomeLocal
        );
        assert!(matches!(
            flow_device_type(&input(&[("device", "anywair")])),
            Err(FlowError::InvalidInput(_))
        ));
        assert!(matches!(
            flow_device_type(&input(&[("device", "daikin")])),
            Err(FlowError::InvalidInput(_))
        ));
        assert!(matches!(
            flow_device_type(&FlowInput::new()),
            Err(FlowError::InvalidInput(_))
        ));
    }
}
