//! Config Entries Manager
//!
//! Owns every config entry, persists them and drives setup/unload through
//! the integration's [`SetupHandler`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::entry::{ConfigEntry, ConfigEntryState};
use crate::state_machine::{calculate_retry_delay, InvalidTransition};
use crate::storage::{Storable, Storage, StorageError};

pub const STORAGE_KEY: &str = "core.config_entries";
pub const STORAGE_VERSION: u32 = 1;
pub const STORAGE_MINOR_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists for domain {domain} with unique_id {unique_id}")]
    AlreadyExists { domain: String, unique_id: String },

    #[error("Cannot unload entry in state {0:?}")]
    CannotUnload(ConfigEntryState),

    #[error("Setup failed: {0}")]
    SetupFailed(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// Outcome reported by an integration that could not finish setup
#[derive(Debug, Error)]
pub enum SetupError {
    /// The device is temporarily unreachable; setup is retried later
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Setup cannot succeed without user intervention
    #[error("{0}")]
    Failed(String),
}

/// Integration hooks invoked for entries of its domain
#[async_trait]
pub trait SetupHandler: Send + Sync {
    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<(), SetupError>;

    async fn unload_entry(&self, _entry: &ConfigEntry) -> Result<(), SetupError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEntriesData {
    pub entries: Vec<ConfigEntry>,
}

impl Storable for ConfigEntriesData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Config Entries Manager
pub struct ConfigEntries {
    storage: Arc<Storage>,

    /// entry_id -> ConfigEntry
    entries: DashMap<String, ConfigEntry>,

    /// (domain, unique_id) -> entry_id
    by_unique_id: DashMap<(String, String), String>,

    /// Serializes setup and unload
    setup_lock: Mutex<()>,

    setup_handlers: DashMap<String, Arc<dyn SetupHandler>>,
}

impl ConfigEntries {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            entries: DashMap::new(),
            by_unique_id: DashMap::new(),
            setup_lock: Mutex::new(()),
            setup_handlers: DashMap::new(),
        }
    }

    /// Load persisted entries
    pub async fn load(&self) -> ConfigEntriesResult<()> {
        if let Some(file) = self.storage.load::<ConfigEntriesData>().await? {
            info!(
                "Loading {} config entries from storage",
                file.data.entries.len()
            );
            for entry in file.data.entries {
                self.index_entry(entry);
            }
        }
        Ok(())
    }

    async fn save(&self) -> ConfigEntriesResult<()> {
        let data = ConfigEntriesData {
            entries: self.iter().collect(),
        };
        self.storage.save(&data).await?;
        debug!("Saved {} config entries to storage", data.entries.len());
        Ok(())
    }

    fn index_entry(&self, entry: ConfigEntry) {
        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id.insert(
                (entry.domain.clone(), unique_id.clone()),
                entry.entry_id.clone(),
            );
        }
        self.entries.insert(entry.entry_id.clone(), entry);
    }

    fn unindex_entry(&self, entry_id: &str) -> Option<ConfigEntry> {
        let (_, entry) = self.entries.remove(entry_id)?;
        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .remove(&(entry.domain.clone(), unique_id.clone()));
        }
        Some(entry)
    }

    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    pub fn get_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        self.iter().filter(|e| e.domain == domain).collect()
    }

    pub fn get_by_unique_id(&self, domain: &str, unique_id: &str) -> Option<ConfigEntry> {
        self.by_unique_id
            .get(&(domain.to_string(), unique_id.to_string()))
            .and_then(|entry_id| self.get(entry_id.value()))
    }

    /// Add a new entry, rejecting a second entry with the same unique_id
    pub async fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if let Some(ref unique_id) = entry.unique_id {
            if self.get_by_unique_id(&entry.domain, unique_id).is_some() {
                return Err(ConfigEntriesError::AlreadyExists {
                    domain: entry.domain.clone(),
                    unique_id: unique_id.clone(),
                });
            }
        }

        self.index_entry(entry.clone());
        if let Err(err) = self.save().await {
            self.unindex_entry(&entry.entry_id);
            return Err(err);
        }

        info!(
            "Added config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry.entry_id
        );
        Ok(entry)
    }

    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .unindex_entry(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        self.save().await?;

        info!("Removed config entry: {} [{}]", entry.title, entry_id);
        Ok(entry)
    }

    fn transition(
        &self,
        entry_id: &str,
        state: ConfigEntryState,
        reason: Option<String>,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let mut entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        entry.try_set_state(state, reason)?;
        debug!("Entry {} state changed to {:?}", entry_id, state);
        Ok(entry.clone())
    }

    pub fn register_setup_handler(&self, domain: &str, handler: Arc<dyn SetupHandler>) {
        self.setup_handlers.insert(domain.to_string(), handler);
        debug!("Registered setup handler for domain: {}", domain);
    }

    /// Set up an entry and return the state it ended in.
    ///
    /// A handler reporting [`SetupError::NotReady`] leaves the entry in
    /// `SetupRetry`; see [`ConfigEntries::retry_delay`] for when to try again.
    pub async fn setup(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntryState> {
        let _lock = self.setup_lock.lock().await;

        let entry = self.transition(entry_id, ConfigEntryState::SetupInProgress, None)?;
        let handler = self
            .setup_handlers
            .get(&entry.domain)
            .map(|h| Arc::clone(h.value()));

        let Some(handler) = handler else {
            debug!(
                "No setup handler for domain {}, marking as loaded",
                entry.domain
            );
            self.transition(entry_id, ConfigEntryState::Loaded, None)?;
            return Ok(ConfigEntryState::Loaded);
        };

        match handler.setup_entry(&entry).await {
            Ok(()) => {
                self.transition(entry_id, ConfigEntryState::Loaded, None)?;
                info!("Setup completed for entry: {} ({})", entry.title, entry_id);
                Ok(ConfigEntryState::Loaded)
            }
            Err(SetupError::NotReady(reason)) => {
                let entry =
                    self.transition(entry_id, ConfigEntryState::SetupRetry, Some(reason.clone()))?;
                warn!(
                    "Config entry '{}' for {} not ready yet: {}; retrying in {:.0} seconds",
                    entry.title,
                    entry.domain,
                    reason,
                    calculate_retry_delay(entry.tries.saturating_sub(1))
                );
                Ok(ConfigEntryState::SetupRetry)
            }
            Err(SetupError::Failed(reason)) => {
                warn!("Setup failed for entry {}: {}", entry_id, reason);
                self.transition(entry_id, ConfigEntryState::SetupError, Some(reason.clone()))?;
                Err(ConfigEntriesError::SetupFailed(reason))
            }
        }
    }

    /// Backoff before retrying an entry parked in `SetupRetry`
    pub fn retry_delay(&self, entry_id: &str) -> Option<Duration> {
        let entry = self.get(entry_id)?;
        (entry.state == ConfigEntryState::SetupRetry).then(|| {
            Duration::from_secs_f64(calculate_retry_delay(entry.tries.saturating_sub(1)))
        })
    }

    pub async fn unload(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        let _lock = self.setup_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if entry.state == ConfigEntryState::NotLoaded {
            return Ok(());
        }
        if !entry.state.is_recoverable() {
            return Err(ConfigEntriesError::CannotUnload(entry.state));
        }

        self.transition(entry_id, ConfigEntryState::UnloadInProgress, None)?;

        let handler = self
            .setup_handlers
            .get(&entry.domain)
            .map(|h| Arc::clone(h.value()));
        if let Some(handler) = handler {
            if let Err(err) = handler.unload_entry(&entry).await {
                warn!("Error unloading entry {}: {}", entry_id, err);
            }
        }

        self.transition(entry_id, ConfigEntryState::NotLoaded, None)?;
        info!("Unloaded entry: {} ({})", entry.title, entry_id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ConfigEntry> + '_ {
        self.entries.iter().map(|r| r.value().clone())
    }

    /// Set up every loaded-from-storage entry
    pub async fn setup_all(&self) -> Vec<ConfigEntriesResult<ConfigEntryState>> {
        let entry_ids: Vec<String> = self.entries.iter().map(|r| r.key().clone()).collect();
        let mut results = Vec::with_capacity(entry_ids.len());
        for entry_id in entry_ids {
            results.push(self.setup(&entry_id).await);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ConfigEntrySource;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    fn create_test_manager() -> (TempDir, ConfigEntries) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));
        (temp_dir, ConfigEntries::new(storage))
    }

    struct Scripted {
        calls: AtomicU32,
        outcome: fn(u32) -> Result<(), SetupError>,
    }

    #[async_trait]
    impl SetupHandler for Scripted {
        async fn setup_entry(&self, _entry: &ConfigEntry) -> Result<(), SetupError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)(call)
        }
    }

    #[tokio::test]
    async fn test_duplicate_unique_id_rejected() {
        let (_dir, manager) = create_test_manager();

        let first = ConfigEntry::new("intesishome", "A").with_unique_id("intesishome_1");
        let second = ConfigEntry::new("intesishome", "B").with_unique_id("intesishome_1");

        manager.add(first).await.unwrap();
        let result = manager.add(second).await;

        assert!(matches!(result, Err(ConfigEntriesError::AlreadyExists { .. })));
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_save_discards_entry() {
        let (dir, manager) = create_test_manager();
        // A plain file where the storage directory belongs
        std::fs::write(dir.path().join(".storage"), "").unwrap();

        let result = manager
            .add(ConfigEntry::new("intesishome", "A").with_unique_id("intesishome_1"))
            .await;

        assert!(matches!(result, Err(ConfigEntriesError::Storage(_))));
        assert!(manager.is_empty());
        assert!(manager
            .get_by_unique_id("intesishome", "intesishome_1")
            .is_none());
    }

    #[tokio::test]
    async fn test_same_unique_id_other_domain_allowed() {
        let (_dir, manager) = create_test_manager();

        manager
            .add(ConfigEntry::new("intesishome", "A").with_unique_id("x"))
            .await
            .unwrap();
        manager
            .add(ConfigEntry::new("other", "B").with_unique_id("x"))
            .await
            .unwrap();

        assert_eq!(manager.len(), 2);
        assert_eq!(manager.get_by_domain("intesishome").len(), 1);
    }

    #[tokio::test]
    async fn test_remove_frees_unique_id() {
        let (_dir, manager) = create_test_manager();

        let entry = manager
            .add(ConfigEntry::new("intesishome", "A").with_unique_id("x"))
            .await
            .unwrap();
        manager.remove(&entry.entry_id).await.unwrap();

        assert!(manager.get_by_unique_id("intesishome", "x").is_none());
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_setup_without_handler_loads() {
        let (_dir, manager) = create_test_manager();
        let entry = manager
            .add(ConfigEntry::new("intesishome", "A"))
            .await
            .unwrap();

        let state = manager.setup(&entry.entry_id).await.unwrap();
        assert_eq!(state, ConfigEntryState::Loaded);

        manager.unload(&entry.entry_id).await.unwrap();
        assert_eq!(
            manager.get(&entry.entry_id).unwrap().state,
            ConfigEntryState::NotLoaded
        );
    }

    #[tokio::test]
    async fn test_not_ready_then_recovers() {
        let (_dir, manager) = create_test_manager();
        manager.register_setup_handler(
            "intesishome",
            Arc::new(Scripted {
                calls: AtomicU32::new(0),
                outcome: |call| {
                    if call == 0 {
                        Err(SetupError::NotReady("connection refused".into()))
                    } else {
                        Ok(())
                    }
                },
            }),
        );
        let entry = manager
            .add(ConfigEntry::new("intesishome", "A"))
            .await
            .unwrap();

        let state = manager.setup(&entry.entry_id).await.unwrap();
        assert_eq!(state, ConfigEntryState::SetupRetry);

        let stored = manager.get(&entry.entry_id).unwrap();
        assert_eq!(stored.reason.as_deref(), Some("connection refused"));
        assert_eq!(stored.tries, 1);
        let delay = manager.retry_delay(&entry.entry_id).unwrap();
        assert!(delay >= Duration::from_secs(5) && delay < Duration::from_secs(6));

        let state = manager.setup(&entry.entry_id).await.unwrap();
        assert_eq!(state, ConfigEntryState::Loaded);
        assert!(manager.retry_delay(&entry.entry_id).is_none());
    }

    #[tokio::test]
    async fn test_failed_setup_sets_error() {
        let (_dir, manager) = create_test_manager();
        manager.register_setup_handler(
            "intesishome",
            Arc::new(Scripted {
                calls: AtomicU32::new(0),
                outcome: |_| Err(SetupError::Failed("bad credentials".into())),
            }),
        );
        let entry = manager
            .add(ConfigEntry::new("intesishome", "A"))
            .await
            .unwrap();

        let result = manager.setup(&entry.entry_id).await;
        assert!(matches!(result, Err(ConfigEntriesError::SetupFailed(_))));
        assert_eq!(
            manager.get(&entry.entry_id).unwrap().state,
            ConfigEntryState::SetupError
        );
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));

        {
            let manager = ConfigEntries::new(storage.clone());
            manager
                .add(
                    ConfigEntry::new("intesishome", "IntesisHome Home")
                        .with_unique_id("intesishome_123")
                        .with_source(ConfigEntrySource::Import),
                )
                .await
                .unwrap();
        }

        let manager = ConfigEntries::new(storage);
        manager.load().await.unwrap();

        let entry = manager
            .get_by_unique_id("intesishome", "intesishome_123")
            .unwrap();
        assert_eq!(entry.title, "IntesisHome Home");
        assert_eq!(entry.source, ConfigEntrySource::Import);
        assert_eq!(entry.state, ConfigEntryState::NotLoaded);
    }
}
