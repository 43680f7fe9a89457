use std::sync::Arc;

use anyhow::Context as _;
use rumqttc::v5::{AsyncClient, mqttbytes::QoS};
use serde::Serialize;

//Publishes below a fixed base topic
#[derive(Clone)]
pub struct MqttSender {
    client: Arc<AsyncClient>,
    base_topic: String,
}

impl MqttSender {
    pub(super) fn new(client: Arc<AsyncClient>, base_topic: impl Into<String>) -> Self {
        Self {
            client,
            base_topic: base_topic.into(),
        }
    }

    pub fn topic(&self, sub_topic: &str) -> String {
        format!("{}/{}", self.base_topic.trim_end_matches('/'), sub_topic)
    }

    pub async fn send_json(&self, sub_topic: &str, payload: &impl Serialize) -> anyhow::Result<()> {
        let topic = self.topic(sub_topic);
        let payload = serde_json::to_string(payload).with_context(|| format!("Error serializing payload for {}", topic))?;
        self.send(topic, payload).await
    }

    #[tracing::instrument(skip_all, fields(topic = %topic, otel.name = format!("MQTT publish {}", topic)))]
    async fn send(&self, topic: String, payload: String) -> anyhow::Result<()> {
        tracing::debug!("Publishing MQTT message to {}: {}", topic, payload);

        self.client
            .publish(topic.clone(), QoS::AtLeastOnce, false, payload)
            .await
            .with_context(|| format!("Error publishing MQTT message to {}", topic))
    }
}
