#![allow(async_fn_in_trait)]

#[cfg(test)]
pub mod fixture;
mod reconciler;
mod registry;

pub use reconciler::DeviceReconciler;
pub use registry::DeviceRegistry;

use std::str::FromStr;

use derive_more::derive::Display;
use serde::Serialize;
use uuid::Uuid;

use crate::camera::StreamController;
use crate::core::unit::{DegreeCelsius, Lux, MilliVolt, Percent};
use crate::station::Station;

const BATTERY_MODEL: &str = "SKY1";
const FULL_BATTERY: MilliVolt = MilliVolt(2600.0);
const LOW_BATTERY_THRESHOLD: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display)]
#[serde(transparent)]
pub struct DeviceId(Uuid);

impl DeviceId {
    pub fn from_station_id(station_id: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, station_id.as_bytes()))
    }
}

impl FromStr for DeviceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

//Opaque reference to the accessory the host created for a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AccessoryHandle(pub String);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReadings {
    pub temperature: DegreeCelsius,
    pub luminance: Lux,
    pub humidity: Percent,
    pub rain: bool,
    pub night: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
//Station batteries cannot be charged, HAP values 0 and 1 never occur
pub enum ChargingState {
    NotChargeable,
}

impl ChargingState {
    pub fn hap_value(&self) -> u8 {
        match self {
            ChargingState::NotChargeable => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryStatus {
    pub level: Percent,
    pub charging_state: ChargingState,
    pub low_battery: bool,
}

impl BatteryStatus {
    //Only the SKY1 model reports a meaningful voltage
    fn derive(station: &Station) -> Option<Self> {
        if station.data.device_type != BATTERY_MODEL {
            return None;
        }

        let level = station.data.voltage.share_of(FULL_BATTERY).clamp();

        Some(Self {
            low_battery: level.0 < LOW_BATTERY_THRESHOLD,
            level,
            charging_state: ChargingState::NotChargeable,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub station_id: String,
    pub name: String,
    pub device_type: String,
    pub image_url: String,
    pub readings: SensorReadings,
    pub battery: Option<BatteryStatus>,
    pub reachable: bool,
    pub handle: Option<AccessoryHandle>,
}

impl DeviceRecord {
    fn new(station: &Station) -> Self {
        let mut record = Self {
            id: DeviceId::from_station_id(&station.device_id),
            station_id: station.device_id.clone(),
            name: station.device_name.clone(),
            device_type: String::new(),
            image_url: String::new(),
            readings: SensorReadings::from(station),
            battery: None,
            reachable: false,
            handle: None,
        };
        record.apply(station);
        record
    }

    fn apply(&mut self, station: &Station) {
        self.name = station.device_name.clone();
        self.device_type = station.data.device_type.clone();
        self.image_url = station.data.image_url.clone();
        self.readings = SensorReadings::from(station);
        self.battery = BatteryStatus::derive(station);
    }
}

impl From<&Station> for SensorReadings {
    fn from(station: &Station) -> Self {
        Self {
            temperature: station.data.temperature,
            luminance: station.data.luminance,
            humidity: station.data.humidity,
            rain: station.data.rain,
            night: station.data.night,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Created { id: DeviceId, image_url: String },
    Updated { id: DeviceId, image_url: String },
}

impl DeviceEvent {
    pub fn id(&self) -> &DeviceId {
        match self {
            DeviceEvent::Created { id, .. } | DeviceEvent::Updated { id, .. } => id,
        }
    }

    pub fn image_url(&self) -> &str {
        match self {
            DeviceEvent::Created { image_url, .. } | DeviceEvent::Updated { image_url, .. } => image_url,
        }
    }
}

//Capabilities the host platform offers for representing devices
pub trait AccessoryHost {
    async fn create_accessory(&self, record: &DeviceRecord) -> anyhow::Result<AccessoryHandle>;

    async fn apply_reading(&self, record: &DeviceRecord) -> anyhow::Result<()>;

    async fn set_reachability(&self, record: &DeviceRecord) -> anyhow::Result<()>;

    //Called once per stream controller the device camera offers
    async fn attach_stream_controller(
        &self,
        record: &DeviceRecord,
        controller: &dyn StreamController,
    ) -> anyhow::Result<()>;

    async fn remove_accessory(&self, record: &DeviceRecord) -> anyhow::Result<()>;
}
