use std::collections::HashMap;
use std::time::Duration;

use infrastructure::{MqttSender, MqttSubscription};
use serde::{Deserialize, Serialize};

use crate::camera::StreamController;
use crate::device::{AccessoryHandle, AccessoryHost, DeviceRecord};

use super::accessory::{AccessoryInformation, CharacteristicUpdate, ServiceDefinition, WeatherStation, service_name};
use super::hap::{HomekitCharacteristic, HomekitService};

//Gives homebridge-mqtt time to create the accessory before services are added
const ACCESSORY_SETTLE_DELAY: Duration = Duration::from_millis(100);

//Publishes accessories to homebridge-mqtt
pub struct HomebridgeHost {
    sender: MqttSender,
}

impl HomebridgeHost {
    pub fn new(sender: MqttSender) -> Self {
        Self { sender }
    }
}

impl AccessoryHost for HomebridgeHost {
    async fn create_accessory(&self, record: &DeviceRecord) -> anyhow::Result<AccessoryHandle> {
        let station = WeatherStation::new(record);
        let name = station.name();

        let mut services = station.services().into_iter();

        if let Some(first) = services.next() {
            let payload = ServiceRegistration::new(&name, first, Some(station.information()));
            self.sender.send_json("to/add", &payload).await?;
            tokio::time::sleep(ACCESSORY_SETTLE_DELAY).await;
        }

        for service in services {
            let payload = ServiceRegistration::new(&name, service, None);
            self.sender.send_json("to/add/service", &payload).await?;
        }

        self.apply_reading(record).await?;

        Ok(AccessoryHandle(name))
    }

    async fn apply_reading(&self, record: &DeviceRecord) -> anyhow::Result<()> {
        let station = WeatherStation::new(record);

        for update in station.updates() {
            self.sender.send_json("to/set", &SetCharacteristic::new(station.name(), update)).await?;
        }

        Ok(())
    }

    async fn set_reachability(&self, record: &DeviceRecord) -> anyhow::Result<()> {
        //example
        // {"name": "A", "reachable": false}
        #[derive(Serialize)]
        struct Payload {
            name: String,
            reachable: bool,
        }

        let payload = Payload {
            name: WeatherStation::new(record).name(),
            reachable: record.reachable,
        };

        self.sender.send_json("to/set/reachability", &payload).await
    }

    //homebridge-mqtt has no camera support, streams are only reachable via the camera API
    async fn attach_stream_controller(
        &self,
        record: &DeviceRecord,
        controller: &dyn StreamController,
    ) -> anyhow::Result<()> {
        tracing::debug!(
            "Stream controller {} of device {} is served by the camera API",
            controller.index(),
            record.id
        );
        Ok(())
    }

    async fn remove_accessory(&self, record: &DeviceRecord) -> anyhow::Result<()> {
        #[derive(Serialize)]
        struct Payload {
            name: String,
        }

        let payload = Payload {
            name: WeatherStation::new(record).name(),
        };

        self.sender.send_json("to/remove", &payload).await
    }
}

//example
// {"name": "A", "service_name": "Temperature", "characteristic": "CurrentTemperature", "value": 21.5}
#[derive(Debug, Serialize)]
struct SetCharacteristic {
    name: String,
    service_name: &'static str,
    characteristic: HomekitCharacteristic,
    value: serde_json::Value,
}

impl SetCharacteristic {
    fn new(name: String, update: CharacteristicUpdate) -> Self {
        Self {
            name,
            service_name: service_name(&update.service),
            characteristic: update.characteristic,
            value: update.value,
        }
    }
}

//Characteristic props are flattened next to the service, "default" keeps the HAP props
#[derive(Debug, Serialize)]
struct ServiceRegistration {
    name: String,
    service_name: &'static str,
    service: HomekitService,
    #[serde(flatten)]
    information: Option<AccessoryInformation>,
    #[serde(flatten)]
    props: HashMap<HomekitCharacteristic, serde_json::Value>,
}

impl ServiceRegistration {
    fn new(name: &str, definition: ServiceDefinition, information: Option<AccessoryInformation>) -> Self {
        let props = definition
            .characteristics
            .into_iter()
            .map(|(characteristic, props)| (characteristic, props.unwrap_or_else(|| "default".into())))
            .collect();

        Self {
            name: name.to_string(),
            service_name: service_name(&definition.service),
            service: definition.service,
            information,
            props,
        }
    }
}

pub struct HomebridgeResponseRunner {
    responses: MqttSubscription,
}

impl HomebridgeResponseRunner {
    pub fn new(responses: MqttSubscription) -> Self {
        Self { responses }
    }

    pub async fn run(mut self) {
        while let Some(msg) = self.responses.recv().await {
            handle_response(&msg.payload);
        }

        tracing::error!("Homebridge response subscription closed");
    }
}

//example
// {"ack": false, "message": "accessory 'A' not found"}
#[derive(Debug, Deserialize)]
struct Response {
    ack: bool,
    #[serde(default)]
    message: Option<String>,
}

fn handle_response(payload: &str) -> Option<bool> {
    let response: Response = match serde_json::from_str(payload) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Error parsing Homebridge response: {:?} -- {:?}", payload, e);
            return None;
        }
    };

    if response.ack {
        tracing::trace!("Homebridge acknowledged request: {:?}", response.message);
    } else {
        tracing::warn!("Homebridge rejected request: {}", response.message.unwrap_or_default());
    }

    Some(response.ack)
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_eq;

    use super::*;
    use crate::device::DeviceRegistry;
    use crate::station::fixture::station;

    fn record(device_type: &str) -> DeviceRecord {
        DeviceRegistry::new().upsert(&station("A", device_type, 2600.0)).clone()
    }

    #[test]
    fn test_accessory_registration_payload() {
        let record = record("SKY1");
        let station = WeatherStation::new(&record);
        let first = station.services().remove(0);

        let payload = ServiceRegistration::new(&station.name(), first, Some(station.information()));

        assert_json_eq!(
            serde_json::to_value(payload).unwrap(),
            serde_json::json!({
                "name": "A",
                "service_name": "Temperature",
                "service": "TemperatureSensor",
                "manufacturer": "Bloomsky",
                "model": "SKY1",
                "serialnumber": "A",
                "firmwarerevision": "SKY1",
                "CurrentTemperature": {"minValue": -50, "maxValue": 100}
            })
        );
    }

    #[test]
    fn test_battery_service_registration_payload() {
        let record = record("SKY1");
        let station = WeatherStation::new(&record);
        let mut services = station.services();

        assert_eq!(
            services.iter().map(|s| s.service.clone()).collect::<Vec<_>>(),
            vec![
                HomekitService::TemperatureSensor,
                HomekitService::LightSensor,
                HomekitService::HumiditySensor,
                HomekitService::MotionSensor,
                HomekitService::OccupancySensor,
                HomekitService::BatteryService,
            ]
        );

        let payload = ServiceRegistration::new(&station.name(), services.remove(5), None);

        assert_json_eq!(
            serde_json::to_value(payload).unwrap(),
            serde_json::json!({
                "name": "A",
                "service_name": "Battery",
                "service": "BatteryService",
                "BatteryLevel": "default",
                "ChargingState": "default",
                "StatusLowBattery": "default"
            })
        );
    }

    #[test]
    fn test_set_payload() {
        let record = record("SKY2");
        let update = WeatherStation::new(&record).updates().remove(0);

        assert_json_eq!(
            serde_json::to_value(SetCharacteristic::new("A".to_string(), update)).unwrap(),
            serde_json::json!({
                "name": "A",
                "service_name": "Temperature",
                "characteristic": "CurrentTemperature",
                "value": 21.5
            })
        );
    }

    #[test]
    fn test_handle_response() {
        assert_eq!(handle_response(r#"{"ack": true, "message": "ok"}"#), Some(true));
        assert_eq!(
            handle_response(r#"{"ack": false, "message": "accessory 'A' not found"}"#),
            Some(false)
        );
        assert_eq!(handle_response("not json"), None);
    }
}
