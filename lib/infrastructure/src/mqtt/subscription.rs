use std::str::Utf8Error;

use rumqttc::v5::mqttbytes::v5::Publish;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttInMessage {
    pub topic: String,
    pub payload: String,
}

impl TryFrom<&Publish> for MqttInMessage {
    type Error = Utf8Error;

    fn try_from(publish: &Publish) -> Result<Self, Self::Error> {
        Ok(Self {
            topic: std::str::from_utf8(&publish.topic)?.to_owned(),
            payload: std::str::from_utf8(&publish.payload)?.to_owned(),
        })
    }
}

//Messages of one subscribed topic, ends when the client stops processing
pub struct MqttSubscription {
    topic: String,
    rx: mpsc::Receiver<MqttInMessage>,
}

impl MqttSubscription {
    pub(super) fn new(topic: String, rx: mpsc::Receiver<MqttInMessage>) -> Self {
        Self { topic, rx }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn recv(&mut self) -> Option<MqttInMessage> {
        self.rx.recv().await
    }
}
