mod accessory;
mod hap;
mod runtime;

pub use runtime::{HomebridgeHost, HomebridgeResponseRunner};

use infrastructure::Mqtt;
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct Homebridge {
    pub base_topic: String,
}

impl Homebridge {
    //Responses of homebridge-mqtt to every request are published on a single topic
    pub async fn new_host(&self, mqtt: &mut Mqtt) -> anyhow::Result<(HomebridgeHost, HomebridgeResponseRunner)> {
        let responses = mqtt.subscribe(format!("{}/from/response", &self.base_topic)).await?;

        Ok((
            HomebridgeHost::new(mqtt.sender(self.base_topic.clone())),
            HomebridgeResponseRunner::new(responses),
        ))
    }
}
