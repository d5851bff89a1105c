//! Scripted controller and factory
//!
//! The mock never changes device records on its own: commands are only
//! recorded, so tests can tell optimistic entity state from pushed state.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ha_intesishome::{
    Connection, ControllerError, ControllerFactory, ControllerResult, DeviceRecord, DeviceType,
    IntesisController, UpdateListener,
};

/// Failure a scripted call reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Authentication,
    Connection,
    Other,
}

impl Failure {
    fn to_error(self) -> ControllerError {
        match self {
            Failure::Authentication => ControllerError::Authentication("bad credentials".into()),
            Failure::Connection => ControllerError::Connection("timed out".into()),
            Failure::Other => ControllerError::Other(anyhow::anyhow!("unexpected payload")),
        }
    }
}

#[derive(Default)]
struct MockState {
    devices: HashMap<String, DeviceRecord>,
    connected: bool,
    error_message: Option<String>,
    connect_failure: Option<Failure>,
    poll_failure: Option<Failure>,
    command_failure: Option<Failure>,
    commands: Vec<String>,
    calls: HashMap<&'static str, usize>,
}

pub struct MockController {
    device_type: DeviceType,
    controller_id: String,
    name: String,
    vertical_swing: bool,
    horizontal_swing: bool,
    fan_speeds: Vec<String>,
    modes: Vec<String>,
    state: Mutex<MockState>,
    listeners: Mutex<Vec<Arc<dyn UpdateListener>>>,
}

impl MockController {
    pub fn new(device_type: DeviceType, controller_id: &str) -> Self {
        Self {
            device_type,
            controller_id: controller_id.to_string(),
            name: "Home".to_string(),
            vertical_swing: false,
            horizontal_swing: false,
            fan_speeds: Vec::new(),
            modes: ["auto", "heat", "dry", "fan", "cool"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            state: Mutex::new(MockState {
                connected: true,
                ..Default::default()
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_device(self, device_id: &str, record: DeviceRecord) -> Self {
        self.state
            .lock()
            .unwrap()
            .devices
            .insert(device_id.to_string(), record);
        self
    }

    pub fn with_devices(self, devices: HashMap<String, DeviceRecord>) -> Self {
        self.state.lock().unwrap().devices.extend(devices);
        self
    }

    pub fn with_swing(mut self, vertical: bool, horizontal: bool) -> Self {
        self.vertical_swing = vertical;
        self.horizontal_swing = horizontal;
        self
    }

    pub fn with_fan_speeds(mut self, speeds: &[&str]) -> Self {
        self.fan_speeds = speeds.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_modes(mut self, modes: &[&str]) -> Self {
        self.modes = modes.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_error_message(self, message: &str) -> Self {
        self.state.lock().unwrap().error_message = Some(message.to_string());
        self
    }

    pub fn fail_connect(&self, failure: Option<Failure>) {
        self.state.lock().unwrap().connect_failure = failure;
    }

    pub fn fail_poll(&self, failure: Option<Failure>) {
        self.state.lock().unwrap().poll_failure = failure;
    }

    pub fn fail_commands(&self, failure: Option<Failure>) {
        self.state.lock().unwrap().command_failure = failure;
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().unwrap().connected = connected;
    }

    /// Change a device record as the vendor library would on a push
    pub fn update_device(&self, device_id: &str, f: impl FnOnce(&mut DeviceRecord)) {
        let mut state = self.state.lock().unwrap();
        f(state.devices.entry(device_id.to_string()).or_default());
    }

    /// Notify every registered listener
    pub fn push_update(&self, device_id: Option<&str>) {
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener.on_update(device_id);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Commands sent so far, as `method:device:value`
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    /// How often a lifecycle method (connect, poll_status, stop) ran
    pub fn calls(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(method)
            .copied()
            .unwrap_or(0)
    }

    fn lifecycle(&self, method: &'static str, failure: Option<Failure>) -> ControllerResult<()> {
        *self.state.lock().unwrap().calls.entry(method).or_insert(0) += 1;
        match failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }

    fn command(&self, method: &str, device_id: &str, value: &str) -> ControllerResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(failure) = state.command_failure {
            return Err(failure.to_error());
        }
        state.commands.push(format!("{method}:{device_id}:{value}"));
        Ok(())
    }
}

#[async_trait]
impl IntesisController for MockController {
    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn controller_id(&self) -> String {
        self.controller_id.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn error_message(&self) -> Option<String> {
        self.state.lock().unwrap().error_message.clone()
    }

    fn get_devices(&self) -> HashMap<String, DeviceRecord> {
        self.state.lock().unwrap().devices.clone()
    }

    fn has_vertical_swing(&self, _device_id: &str) -> bool {
        self.vertical_swing
    }

    fn has_horizontal_swing(&self, _device_id: &str) -> bool {
        self.horizontal_swing
    }

    fn get_fan_speed_list(&self, _device_id: &str) -> Vec<String> {
        self.fan_speeds.clone()
    }

    fn get_mode_list(&self, _device_id: &str) -> Vec<String> {
        self.modes.clone()
    }

    fn add_update_callback(&self, listener: Arc<dyn UpdateListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    async fn connect(&self) -> ControllerResult<()> {
        let failure = self.state.lock().unwrap().connect_failure;
        self.lifecycle("connect", failure)
    }

    async fn poll_status(&self) -> ControllerResult<()> {
        let failure = self.state.lock().unwrap().poll_failure;
        self.lifecycle("poll_status", failure)
    }

    async fn stop(&self) -> ControllerResult<()> {
        self.lifecycle("stop", None)
    }

    async fn set_temperature(&self, device_id: &str, setpoint: f64) -> ControllerResult<()> {
        self.command("set_temperature", device_id, &setpoint.to_string())
    }

    async fn set_power_off(&self, device_id: &str) -> ControllerResult<()> {
        self.command("set_power_off", device_id, "")
    }

    async fn set_mode(&self, device_id: &str, mode: &str) -> ControllerResult<()> {
        self.command("set_mode", device_id, mode)
    }

    async fn set_fan_speed(&self, device_id: &str, fan_speed: &str) -> ControllerResult<()> {
        self.command("set_fan_speed", device_id, fan_speed)
    }

    async fn set_vertical_vane(&self, device_id: &str, position: &str) -> ControllerResult<()> {
        self.command("set_vertical_vane", device_id, position)
    }

    async fn set_horizontal_vane(
        &self,
        device_id: &str,
        position: &str,
    ) -> ControllerResult<()> {
        self.command("set_horizontal_vane", device_id, position)
    }

    async fn set_preset_mode(&self, device_id: &str, preset: &str) -> ControllerResult<()> {
        self.command("set_preset_mode", device_id, preset)
    }
}

/// Hands out scripted controllers in order and records each connection
#[derive(Default)]
pub struct MockFactory {
    controllers: Mutex<VecDeque<Arc<MockController>>>,
    connections: Mutex<Vec<Connection>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a controller for the next `create`
    pub fn push(&self, controller: MockController) -> Arc<MockController> {
        let controller = Arc::new(controller);
        self.controllers
            .lock()
            .unwrap()
            .push_back(Arc::clone(&controller));
        controller
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.connections.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.controllers.lock().unwrap().len()
    }
}

impl ControllerFactory for MockFactory {
    fn create(&self, connection: &Connection) -> ControllerResult<Arc<dyn IntesisController>> {
        self.connections.lock().unwrap().push(connection.clone());
        let controller: Arc<dyn IntesisController> = self
            .controllers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ControllerError::Other(anyhow::anyhow!("no controller scripted")))?;
        Ok(controller)
    }
}

/// A powered-on unit in cool mode
pub fn cooling_record(name: &str) -> DeviceRecord {
    DeviceRecord {
        name: Some(name.to_string()),
        power: Some("on".to_string()),
        mode: Some("cool".to_string()),
        setpoint: Some(24.0),
        temperature: Some(26.0),
        setpoint_min: Some(18.0),
        setpoint_max: Some(30.0),
        ..Default::default()
    }
}
