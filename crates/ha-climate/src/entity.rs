//! Entity lifecycle shared by all platforms

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntityError {
    /// The device is temporarily unreachable; the host should retry the
    /// whole platform setup later instead of failing the entry.
    #[error("Platform not ready: {0}")]
    PlatformNotReady(String),

    #[error("Unsupported {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("{0} is not supported by this entity")]
    NotSupported(&'static str),

    #[error(transparent)]
    Device(#[from] anyhow::Error),
}

pub type EntityResult<T> = Result<T, EntityError>;

/// Capabilities every entity exposes to the host
#[async_trait]
pub trait Entity: Send + Sync {
    fn unique_id(&self) -> Option<String>;

    fn name(&self) -> Option<String>;

    fn available(&self) -> bool {
        true
    }

    /// Push-based entities return false and write state themselves
    fn should_poll(&self) -> bool {
        true
    }

    fn icon(&self) -> Option<&'static str> {
        None
    }

    fn extra_state_attributes(&self) -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }

    /// Called once the host has registered the entity
    async fn async_added_to_hass(&self) -> EntityResult<()> {
        Ok(())
    }

    async fn async_will_remove_from_hass(&self) -> EntityResult<()> {
        Ok(())
    }

    /// Refresh cached state
    async fn async_update(&self) -> EntityResult<()> {
        Ok(())
    }
}
