//! Minimal host for integration tests
//!
//! Config entries backed by a temporary `.storage/` directory, a flow
//! manager, and the IntesisHome integration registered with both.

use std::path::Path;
use std::sync::Arc;

use ha_config_entries::{ConfigEntries, FlowManager, Storage};
use ha_intesishome::IntesisHome;
use tempfile::TempDir;

use super::MockFactory;

pub struct TestHass {
    pub config_entries: Arc<ConfigEntries>,
    pub flows: FlowManager,
    pub integration: Arc<IntesisHome>,
    pub factory: Arc<MockFactory>,
    _config_dir: TempDir,
}

impl TestHass {
    pub fn new() -> Self {
        let config_dir = TempDir::new().unwrap();
        Self::with_config_dir(config_dir, MockFactory::new())
    }

    /// Start over from the entries persisted in `config_dir`
    pub fn with_config_dir(config_dir: TempDir, factory: Arc<MockFactory>) -> Self {
        let storage = Arc::new(Storage::new(config_dir.path()));
        let config_entries = Arc::new(ConfigEntries::new(storage));
        let flows = FlowManager::new(Arc::clone(&config_entries));
        let integration = IntesisHome::new(factory.clone());
        integration.register(&config_entries, &flows);

        Self {
            config_entries,
            flows,
            integration,
            factory,
            _config_dir: config_dir,
        }
    }

    pub fn config_dir(&self) -> &Path {
        self._config_dir.path()
    }

    /// Simulate a restart: same storage, fresh process state
    pub async fn restart(self, factory: Arc<MockFactory>) -> Self {
        let restarted = Self::with_config_dir(self._config_dir, factory);
        restarted.config_entries.load().await.unwrap();
        restarted
    }
}
