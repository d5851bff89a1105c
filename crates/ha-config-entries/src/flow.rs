//! Config flows
//!
//! A config flow is a small wizard an integration exposes to create a
//! config entry. Each step either renders a form (optionally with errors),
//! creates an entry, or aborts. The [`FlowManager`] keeps in-progress flows
//! between user submissions and persists the entry a flow creates.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::entry::{ConfigEntry, ConfigEntrySource};
use crate::manager::{ConfigEntries, ConfigEntriesError};

/// User input submitted to a step, keyed by field name
pub type FlowInput = HashMap<String, serde_json::Value>;

/// Abort reason used when the unique_id already has an entry
pub const ABORT_ALREADY_CONFIGURED: &str = "already_configured";

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("No config flow registered for {0}")]
    UnknownHandler(String),

    #[error("Flow not found: {0}")]
    UnknownFlow(String),

    #[error("Flow has no step {0}")]
    UnknownStep(String),

    #[error("Invalid user input: {0}")]
    InvalidInput(String),

    /// Ends the flow with the given reason
    #[error("Flow aborted: {0}")]
    Abort(String),

    #[error(transparent)]
    Entries(#[from] ConfigEntriesError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowResultType {
    Form,
    CreateEntry,
    Abort,
}

/// Form field schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Allowed values for `select` fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl FormField {
    /// Required free-text field
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: "string".to_string(),
            required: true,
            default: None,
            options: Vec::new(),
        }
    }

    /// Required field restricted to `options`
    pub fn select<I, S>(name: impl Into<String>, options: I, default: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            field_type: "select".to_string(),
            required: true,
            default: default.map(|d| serde_json::Value::String(d.to_string())),
            options: options.into_iter().map(Into::into).collect(),
        }
    }
}

/// Result of a config flow step
#[derive(Debug, Clone, Serialize)]
pub struct FlowResult {
    pub flow_id: String,
    pub handler: String,
    #[serde(rename = "type")]
    pub result_type: FlowResultType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub data_schema: Vec<FormField>,
    /// Errors from the previous submission, null if none
    pub errors: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Entry data (create_entry)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<FlowInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Id of the entry that was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl FlowResult {
    fn empty(result_type: FlowResultType) -> Self {
        Self {
            flow_id: String::new(),
            handler: String::new(),
            result_type,
            step_id: None,
            data_schema: Vec::new(),
            errors: None,
            title: None,
            reason: None,
            data: None,
            version: None,
            result: None,
        }
    }

    pub fn form(
        step_id: impl Into<String>,
        data_schema: Vec<FormField>,
        errors: HashMap<String, String>,
    ) -> Self {
        Self {
            step_id: Some(step_id.into()),
            data_schema,
            errors: (!errors.is_empty()).then_some(errors),
            ..Self::empty(FlowResultType::Form)
        }
    }

    pub fn create_entry(title: impl Into<String>, data: FlowInput) -> Self {
        Self {
            title: Some(title.into()),
            data: Some(data),
            ..Self::empty(FlowResultType::CreateEntry)
        }
    }

    pub fn abort(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::empty(FlowResultType::Abort)
        }
    }

    /// Error code attached to the `base` key, if any
    pub fn base_error(&self) -> Option<&str> {
        self.errors.as_ref()?.get("base").map(String::as_str)
    }

    /// Look up a field of a rendered form
    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.data_schema.iter().find(|f| f.name == name)
    }
}

/// Per-flow session data shared with the flow's steps
pub struct FlowContext {
    pub flow_id: String,
    pub handler: String,
    pub source: ConfigEntrySource,
    unique_id: Option<String>,
    entries: Arc<ConfigEntries>,
}

impl FlowContext {
    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    pub fn set_unique_id(&mut self, unique_id: impl Into<String>) {
        self.unique_id = Some(unique_id.into());
    }

    /// Abort the flow when an entry with the flow's unique_id exists
    pub fn abort_if_unique_id_configured(&self) -> Result<(), FlowError> {
        if let Some(ref unique_id) = self.unique_id {
            if self
                .entries
                .get_by_unique_id(&self.handler, unique_id)
                .is_some()
            {
                return Err(FlowError::Abort(ABORT_ALREADY_CONFIGURED.to_string()));
            }
        }
        Ok(())
    }
}

/// A config flow implemented by an integration
#[async_trait]
pub trait ConfigFlow: Send + Sync {
    /// Version stamped on entries this flow creates
    fn version(&self) -> u32 {
        1
    }

    /// Run `step_id` with the submitted input (`None` renders the form)
    async fn async_step(
        &mut self,
        ctx: &mut FlowContext,
        step_id: &str,
        user_input: Option<FlowInput>,
    ) -> Result<FlowResult, FlowError>;

    /// Release what the flow holds when it ends without a stored entry
    async fn async_remove(&mut self) {}
}

/// Builds a fresh flow for a domain
pub type FlowFactory = Arc<dyn Fn() -> Box<dyn ConfigFlow> + Send + Sync>;

struct ActiveFlow {
    ctx: FlowContext,
    flow: Box<dyn ConfigFlow>,
    step_id: String,
}

/// Tracks in-progress flows and turns finished flows into config entries
pub struct FlowManager {
    entries: Arc<ConfigEntries>,
    factories: DashMap<String, FlowFactory>,
    flows: Mutex<HashMap<String, ActiveFlow>>,
}

impl FlowManager {
    pub fn new(entries: Arc<ConfigEntries>) -> Self {
        Self {
            entries,
            factories: DashMap::new(),
            flows: Mutex::new(HashMap::new()),
        }
    }

    pub fn register_flow(&self, domain: &str, factory: FlowFactory) {
        self.factories.insert(domain.to_string(), factory);
        debug!("Registered config flow for domain: {}", domain);
    }

    /// Start a flow; user flows begin at `user`, imports at `import`
    pub async fn start_flow(
        &self,
        handler: &str,
        source: ConfigEntrySource,
        data: Option<FlowInput>,
    ) -> Result<FlowResult, FlowError> {
        let factory = self
            .factories
            .get(handler)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| FlowError::UnknownHandler(handler.to_string()))?;

        let active = ActiveFlow {
            ctx: FlowContext {
                flow_id: Ulid::new().to_string(),
                handler: handler.to_string(),
                source,
                unique_id: None,
                entries: Arc::clone(&self.entries),
            },
            flow: factory(),
            step_id: match source {
                ConfigEntrySource::User => "user".to_string(),
                ConfigEntrySource::Import => "import".to_string(),
            },
        };

        debug!(
            "Starting {} flow {} ({:?})",
            handler, active.ctx.flow_id, source
        );
        self.run_step(active, data).await
    }

    /// Submit input to the current step of a flow
    pub async fn progress_flow(
        &self,
        flow_id: &str,
        user_input: Option<FlowInput>,
    ) -> Result<FlowResult, FlowError> {
        let active = self
            .flows
            .lock()
            .await
            .remove(flow_id)
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;
        self.run_step(active, user_input).await
    }

    /// Ids and current steps of in-progress flows
    pub async fn list_flows(&self) -> Vec<serde_json::Value> {
        self.flows
            .lock()
            .await
            .values()
            .map(|f| {
                serde_json::json!({
                    "flow_id": f.ctx.flow_id,
                    "handler": f.ctx.handler,
                    "step_id": f.step_id,
                    "source": f.ctx.source,
                })
            })
            .collect()
    }

    async fn run_step(
        &self,
        mut active: ActiveFlow,
        user_input: Option<FlowInput>,
    ) -> Result<FlowResult, FlowError> {
        let outcome = active
            .flow
            .async_step(&mut active.ctx, &active.step_id, user_input)
            .await;

        let mut result = match outcome {
            Ok(result) => result,
            Err(FlowError::Abort(reason)) => FlowResult::abort(reason),
            Err(err) => {
                // Keep the flow so the user can resubmit
                self.flows
                    .lock()
                    .await
                    .insert(active.ctx.flow_id.clone(), active);
                return Err(err);
            }
        };
        result.flow_id = active.ctx.flow_id.clone();
        result.handler = active.ctx.handler.clone();

        match result.result_type {
            FlowResultType::Form => {
                if let Some(ref step_id) = result.step_id {
                    active.step_id = step_id.clone();
                }
                self.flows
                    .lock()
                    .await
                    .insert(active.ctx.flow_id.clone(), active);
            }
            FlowResultType::CreateEntry => {
                result = self.create_entry(active, result).await?;
            }
            FlowResultType::Abort => {
                active.flow.async_remove().await;
                info!(
                    "Flow {} for {} aborted: {}",
                    result.flow_id,
                    result.handler,
                    result.reason.as_deref().unwrap_or_default()
                );
            }
        }

        Ok(result)
    }

    async fn create_entry(
        &self,
        mut active: ActiveFlow,
        mut result: FlowResult,
    ) -> Result<FlowResult, FlowError> {
        let mut entry = ConfigEntry::new(
            active.ctx.handler.clone(),
            result.title.clone().unwrap_or_default(),
        )
        .with_data(result.data.clone().unwrap_or_default())
        .with_source(active.ctx.source)
        .with_version(active.flow.version());
        if let Some(unique_id) = active.ctx.unique_id() {
            entry = entry.with_unique_id(unique_id);
        }

        let entry = match self.entries.add(entry).await {
            Ok(entry) => entry,
            Err(ConfigEntriesError::AlreadyExists { .. }) => {
                active.flow.async_remove().await;
                let mut abort = FlowResult::abort(ABORT_ALREADY_CONFIGURED);
                abort.flow_id = result.flow_id;
                abort.handler = result.handler;
                return Ok(abort);
            }
            Err(err) => {
                warn!("Flow {} could not store its entry: {}", result.flow_id, err);
                active.flow.async_remove().await;
                return Err(err.into());
            }
        };

        if let Err(err) = self.entries.setup(&entry.entry_id).await {
            warn!("Setup of new entry {} failed: {}", entry.entry_id, err);
        }

        result.version = Some(entry.version);
        result.result = Some(entry.entry_id);
        Ok(result)
    }
}
