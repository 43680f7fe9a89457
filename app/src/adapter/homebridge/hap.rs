use serde::{Deserialize, Serialize};

// https://github.com/homebridge/HAP-NodeJS/blob/latest/src/lib/definitions/ServiceDefinitions.ts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HomekitService {
    BatteryService,
    HumiditySensor,
    LightSensor,
    MotionSensor,
    OccupancySensor,
    TemperatureSensor,
}

// https://github.com/homebridge/HAP-NodeJS/blob/latest/src/lib/definitions/CharacteristicDefinitions.ts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HomekitCharacteristic {
    BatteryLevel,
    ChargingState,
    CurrentAmbientLightLevel,
    CurrentRelativeHumidity,
    CurrentTemperature,
    MotionDetected,
    OccupancyDetected,
    StatusLowBattery,
}
