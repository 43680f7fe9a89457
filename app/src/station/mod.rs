mod poller;

pub use poller::StationPoller;

use serde::{Deserialize, Serialize};

use crate::core::unit::{DegreeCelsius, Lux, MilliVolt, Percent};

//Wire format of the Bloomsky sky data API (unit=intl)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Station {
    #[serde(rename = "DeviceID")]
    pub device_id: String,
    pub device_name: String,
    pub data: StationData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StationData {
    pub temperature: DegreeCelsius,
    pub luminance: Lux,
    pub humidity: Percent,
    pub rain: bool,
    pub night: bool,
    pub voltage: MilliVolt,
    pub device_type: String,
    #[serde(rename = "ImageURL")]
    pub image_url: String,
}

#[cfg(test)]
pub mod fixture {
    use super::*;

    pub fn station(id: &str, device_type: &str, voltage: f64) -> Station {
        Station {
            device_id: id.to_string(),
            device_name: format!("Sky {}", id),
            data: StationData {
                temperature: DegreeCelsius(21.5),
                luminance: Lux(1200.0),
                humidity: Percent(48.0),
                rain: false,
                night: false,
                voltage: MilliVolt(voltage),
                device_type: device_type.to_string(),
                image_url: format!("http://127.0.0.1:9/{}.jpg", id),
            },
        }
    }
}
