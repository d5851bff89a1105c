//! Config Entries
//!
//! The configuration entry system: persisted integration instances, their
//! setup lifecycle, and the config flows that create them.
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single integration configuration
//! - [`ConfigEntryState`] - Lifecycle state of an entry
//! - [`ConfigEntries`] - Manager for all config entries
//! - [`FlowManager`] - Runs config flows and persists their results
//!
//! # Storage
//!
//! Config entries are persisted in `.storage/core.config_entries`.

pub mod entry;
pub mod flow;
pub mod manager;
pub mod state_machine;
pub mod storage;

pub use entry::{ConfigEntry, ConfigEntrySource, ConfigEntryState};

pub use flow::{
    ConfigFlow, FlowContext, FlowError, FlowFactory, FlowInput, FlowManager, FlowResult,
    FlowResultType, FormField, ABORT_ALREADY_CONFIGURED,
};

pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult, SetupError,
    SetupHandler, STORAGE_KEY, STORAGE_MINOR_VERSION, STORAGE_VERSION,
};

pub use state_machine::{calculate_retry_delay, InvalidTransition};

pub use storage::{Storage, StorageError, StorageFile, StorageResult};
