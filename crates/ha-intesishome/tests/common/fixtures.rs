//! Test fixtures and data loading

use std::collections::HashMap;
use std::path::Path;

use ha_intesishome::DeviceRecord;

/// Load a fixture file as a string
///
/// Fixtures are stored in the `tests/fixtures/` directory.
pub fn load_fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);

    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to load fixture '{}' from {:?}: {}", name, path, e))
}

/// Load device records keyed by device id
pub fn load_devices_fixture(name: &str) -> HashMap<String, DeviceRecord> {
    let content = load_fixture(name);
    serde_json::from_str(&content)
        .unwrap_or_else(|e| panic!("Failed to parse fixture '{}' as devices: {}", name, e))
}
