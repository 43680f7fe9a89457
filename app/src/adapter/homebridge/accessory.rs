use serde::Serialize;
use serde_json::{Value, json};

use crate::core::unit::Lux;
use crate::device::DeviceRecord;

use super::hap::{HomekitCharacteristic, HomekitService};

const MANUFACTURER: &str = "Bloomsky";
const MIN_LIGHT_LEVEL: Lux = Lux(0.0001);

//Label of the service within the accessory, homebridge-mqtt addresses services by it
pub(super) fn service_name(service: &HomekitService) -> &'static str {
    match service {
        HomekitService::TemperatureSensor => "Temperature",
        HomekitService::LightSensor => "Luminance",
        HomekitService::HumiditySensor => "Humidity",
        HomekitService::MotionSensor => "Rain",
        HomekitService::OccupancySensor => "Night",
        HomekitService::BatteryService => "Battery",
    }
}

#[derive(Debug, Clone, Serialize)]
pub(super) struct AccessoryInformation {
    manufacturer: &'static str,
    model: String,
    serialnumber: String,
    firmwarerevision: String,
}

//One Homebridge accessory per weather station, identified by the station id
pub(super) struct WeatherStation<'a> {
    record: &'a DeviceRecord,
}

impl<'a> WeatherStation<'a> {
    pub fn new(record: &'a DeviceRecord) -> Self {
        Self { record }
    }

    pub fn name(&self) -> String {
        self.record.station_id.clone()
    }

    pub fn information(&self) -> AccessoryInformation {
        AccessoryInformation {
            manufacturer: MANUFACTURER,
            model: self.record.device_type.clone(),
            serialnumber: self.record.station_id.clone(),
            firmwarerevision: self.record.device_type.clone(),
        }
    }

    //Service order matters, the first service creates the accessory
    pub fn services(&self) -> Vec<ServiceDefinition> {
        let mut services = vec![
            ServiceDefinition::new(HomekitService::TemperatureSensor)
                .with_props(HomekitCharacteristic::CurrentTemperature, json!({"minValue": -50, "maxValue": 100})),
            ServiceDefinition::new(HomekitService::LightSensor).with(HomekitCharacteristic::CurrentAmbientLightLevel),
            ServiceDefinition::new(HomekitService::HumiditySensor).with(HomekitCharacteristic::CurrentRelativeHumidity),
            ServiceDefinition::new(HomekitService::MotionSensor).with(HomekitCharacteristic::MotionDetected),
            ServiceDefinition::new(HomekitService::OccupancySensor).with(HomekitCharacteristic::OccupancyDetected),
        ];

        if self.record.battery.is_some() {
            services.push(
                ServiceDefinition::new(HomekitService::BatteryService)
                    .with(HomekitCharacteristic::BatteryLevel)
                    .with(HomekitCharacteristic::ChargingState)
                    .with(HomekitCharacteristic::StatusLowBattery),
            );
        }

        services
    }

    pub fn updates(&self) -> Vec<CharacteristicUpdate> {
        let readings = &self.record.readings;

        let mut updates = vec![
            CharacteristicUpdate::new(
                HomekitService::TemperatureSensor,
                HomekitCharacteristic::CurrentTemperature,
                json!(readings.temperature.0),
            ),
            //HomeKit rejects light levels below its minimum
            CharacteristicUpdate::new(
                HomekitService::LightSensor,
                HomekitCharacteristic::CurrentAmbientLightLevel,
                json!(readings.luminance.at_least(MIN_LIGHT_LEVEL)),
            ),
            CharacteristicUpdate::new(
                HomekitService::HumiditySensor,
                HomekitCharacteristic::CurrentRelativeHumidity,
                json!(readings.humidity.0),
            ),
            CharacteristicUpdate::new(
                HomekitService::MotionSensor,
                HomekitCharacteristic::MotionDetected,
                json!(readings.rain),
            ),
            CharacteristicUpdate::new(
                HomekitService::OccupancySensor,
                HomekitCharacteristic::OccupancyDetected,
                json!(u8::from(readings.night)),
            ),
        ];

        if let Some(battery) = &self.record.battery {
            updates.extend([
                CharacteristicUpdate::new(
                    HomekitService::BatteryService,
                    HomekitCharacteristic::BatteryLevel,
                    json!(battery.level.0.round() as u8),
                ),
                CharacteristicUpdate::new(
                    HomekitService::BatteryService,
                    HomekitCharacteristic::ChargingState,
                    json!(battery.charging_state.hap_value()),
                ),
                CharacteristicUpdate::new(
                    HomekitService::BatteryService,
                    HomekitCharacteristic::StatusLowBattery,
                    json!(u8::from(battery.low_battery)),
                ),
            ]);
        }

        updates
    }
}

//Characteristics without props are registered with the HAP defaults
#[derive(Debug, Clone)]
pub(super) struct ServiceDefinition {
    pub service: HomekitService,
    pub characteristics: Vec<(HomekitCharacteristic, Option<Value>)>,
}

impl ServiceDefinition {
    fn new(service: HomekitService) -> Self {
        Self {
            service,
            characteristics: vec![],
        }
    }

    fn with(mut self, characteristic: HomekitCharacteristic) -> Self {
        self.characteristics.push((characteristic, None));
        self
    }

    fn with_props(mut self, characteristic: HomekitCharacteristic, props: Value) -> Self {
        self.characteristics.push((characteristic, Some(props)));
        self
    }
}

#[derive(Debug, Clone)]
pub(super) struct CharacteristicUpdate {
    pub service: HomekitService,
    pub characteristic: HomekitCharacteristic,
    pub value: Value,
}

impl CharacteristicUpdate {
    fn new(service: HomekitService, characteristic: HomekitCharacteristic, value: Value) -> Self {
        Self {
            service,
            characteristic,
            value,
        }
    }
}
