use std::sync::Mutex;

use super::{AccessoryHandle, AccessoryHost, DeviceRecord};
use crate::camera::StreamController;

#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Create(String),
    Apply(String),
    Reachability(String, bool),
    AttachController(String, usize),
    Remove(String),
}

#[derive(Default)]
pub struct RecordingHost {
    calls: Mutex<Vec<HostCall>>,
    failing_station: Mutex<Option<String>>,
}

impl RecordingHost {
    pub fn failing_for(station_id: &str) -> Self {
        Self {
            failing_station: Mutex::new(Some(station_id.to_string())),
            ..Self::default()
        }
    }

    pub fn recover(&self) {
        *self.failing_station.lock().unwrap() = None;
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: HostCall, record: &DeviceRecord) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(call);
        match self.failing_station.lock().unwrap().as_ref() {
            Some(failing) if failing == &record.station_id => anyhow::bail!("host rejected {}", failing),
            _ => Ok(()),
        }
    }
}

impl AccessoryHost for RecordingHost {
    async fn create_accessory(&self, record: &DeviceRecord) -> anyhow::Result<AccessoryHandle> {
        self.record(HostCall::Create(record.station_id.clone()), record)?;
        Ok(AccessoryHandle(format!("accessory-{}", record.station_id)))
    }

    async fn apply_reading(&self, record: &DeviceRecord) -> anyhow::Result<()> {
        self.record(HostCall::Apply(record.station_id.clone()), record)
    }

    async fn set_reachability(&self, record: &DeviceRecord) -> anyhow::Result<()> {
        self.record(
            HostCall::Reachability(record.station_id.clone(), record.reachable),
            record,
        )
    }

    async fn attach_stream_controller(
        &self,
        record: &DeviceRecord,
        controller: &dyn StreamController,
    ) -> anyhow::Result<()> {
        self.record(
            HostCall::AttachController(record.station_id.clone(), controller.index()),
            record,
        )
    }

    async fn remove_accessory(&self, record: &DeviceRecord) -> anyhow::Result<()> {
        self.record(HostCall::Remove(record.station_id.clone()), record)
    }
}
