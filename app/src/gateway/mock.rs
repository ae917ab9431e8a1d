use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use tokio::time::Instant;

use crate::{
    core::unit::DegreeFahrenheit,
    device::{DeviceId, DeviceMode, DeviceStatus},
    gateway::{Ack, DeviceGateway, GatewayError},
};

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    FetchStatus(DeviceId),
    SetTarget(DeviceId, DegreeFahrenheit),
    SetMode(DeviceId, DeviceMode),
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub call: GatewayCall,
    pub at: Instant,
}

/// Scripted gateway. Status responses are taken from a per-device script first and fall back to the
/// current device state; writes succeed unless failures were scripted and update the device state
/// unless `drop_writes` is set.
#[derive(Clone, Default)]
pub struct MockGateway {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    devices: HashMap<DeviceId, DeviceStatus>,
    fetch_script: HashMap<DeviceId, VecDeque<Result<DeviceStatus, GatewayError>>>,
    write_failures: VecDeque<GatewayError>,
    drop_writes: bool,
    fetch_delay: Option<std::time::Duration>,
    target_resolution: Option<DegreeFahrenheit>,
    calls: Vec<RecordedCall>,
}

pub fn status(target_celsius: f64, mode: DeviceMode) -> DeviceStatus {
    DeviceStatus {
        connected: true,
        running: true,
        current_temperature: Some(crate::core::unit::DegreeCelsius(19.5)),
        target_temperature: Some(crate::core::unit::DegreeCelsius(target_celsius)),
        mode,
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, device_id: &str, status: DeviceStatus) -> Self {
        self.state().devices.insert(DeviceId::new(device_id), status);
        self
    }

    pub fn with_fetch_delay(self, delay: std::time::Duration) -> Self {
        self.state().fetch_delay = Some(delay);
        self
    }

    /// Stores target temperatures rounded to `step`, like a remote with limited precision.
    pub fn with_target_resolution(self, step: DegreeFahrenheit) -> Self {
        self.state().target_resolution = Some(step);
        self
    }

    pub fn dropping_writes(self) -> Self {
        self.state().drop_writes = true;
        self
    }

    pub fn script_fetch(&self, device_id: &str, result: Result<DeviceStatus, GatewayError>) {
        self.state()
            .fetch_script
            .entry(DeviceId::new(device_id))
            .or_default()
            .push_back(result);
    }

    pub fn fail_next_writes(&self, errors: impl IntoIterator<Item = GatewayError>) {
        self.state().write_failures.extend(errors);
    }

    pub fn set_device(&self, device_id: &str, status: DeviceStatus) {
        self.state().devices.insert(DeviceId::new(device_id), status);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn fetch_count(&self, device_id: &str) -> usize {
        let device_id = DeviceId::new(device_id);
        self.calls()
            .iter()
            .filter(|c| c.call == GatewayCall::FetchStatus(device_id.clone()))
            .count()
    }

    pub fn write_calls(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c.call, GatewayCall::FetchStatus(_)))
            .collect()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.inner.lock().unwrap()
    }

    fn record(&self, call: GatewayCall) {
        self.state().calls.push(RecordedCall {
            call,
            at: Instant::now(),
        });
    }

    fn apply_write(&self, device_id: &DeviceId, update: impl FnOnce(&mut DeviceStatus)) -> Result<Ack, GatewayError> {
        let mut state = self.state();

        if let Some(error) = state.write_failures.pop_front() {
            return Err(error);
        }

        if !state.drop_writes {
            if let Some(device) = state.devices.get_mut(device_id) {
                update(device);
            }
        }

        Ok(Ack { status: 200 })
    }
}

impl DeviceGateway for MockGateway {
    async fn fetch_status(&self, device_id: &DeviceId) -> Result<DeviceStatus, GatewayError> {
        self.record(GatewayCall::FetchStatus(device_id.clone()));

        let delay = self.state().fetch_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if let Some(result) = state.fetch_script.get_mut(device_id).and_then(|s| s.pop_front()) {
            return result;
        }

        state
            .devices
            .get(device_id)
            .cloned()
            .ok_or_else(|| GatewayError::from_status(404, format!("Unknown device {}", device_id)))
    }

    async fn set_target(&self, device_id: &DeviceId, value: DegreeFahrenheit) -> Result<Ack, GatewayError> {
        self.record(GatewayCall::SetTarget(device_id.clone(), value));
        let stored = match self.state().target_resolution {
            Some(step) => value.round_to(step),
            None => value,
        };
        self.apply_write(device_id, |device| device.target_temperature = Some(stored.into()))
    }

    async fn set_mode(&self, device_id: &DeviceId, mode: DeviceMode) -> Result<Ack, GatewayError> {
        self.record(GatewayCall::SetMode(device_id.clone(), mode));
        self.apply_write(device_id, |device| device.mode = mode)
    }

    fn target_resolution(&self) -> Option<DegreeFahrenheit> {
        self.state().target_resolution
    }
}
