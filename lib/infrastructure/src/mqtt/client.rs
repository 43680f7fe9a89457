use std::sync::Arc;
use std::time::Duration;

use rumqttc::v5::Event::Incoming;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::mqttbytes::v5::{Packet, Publish, SubscribeProperties};
use rumqttc::v5::{AsyncClient, EventLoop, MqttOptions};
use tokio::sync::mpsc;

use super::{MqttInMessage, MqttSender, MqttSubscription};

const REQUEST_CAPACITY: usize = 10;
const SUBSCRIPTION_CAPACITY: usize = 32;
const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub struct Mqtt {
    client: Arc<AsyncClient>,
    event_loop: EventLoop,
    //Index + 1 is the MQTT subscription identifier
    subscriptions: Vec<SubscriptionHandle>,
}

struct SubscriptionHandle {
    topic: String,
    txs: Vec<mpsc::Sender<MqttInMessage>>,
}

impl Mqtt {
    pub(super) fn new(options: MqttOptions) -> Self {
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        Self {
            client: Arc::new(client),
            event_loop,
            subscriptions: vec![],
        }
    }

    pub async fn subscribe(&mut self, topic: impl Into<String>) -> anyhow::Result<MqttSubscription> {
        let topic = topic.into();
        let (tx, rx) = mpsc::channel::<MqttInMessage>(SUBSCRIPTION_CAPACITY);

        if let Some(existing) = self.subscriptions.iter_mut().find(|s| s.topic == topic) {
            tracing::info!("Adding subscriber to existing subscription of {}", topic);
            existing.txs.push(tx);
            return Ok(MqttSubscription::new(topic, rx));
        }

        tracing::info!("Subscribing to MQTT topic {}", topic);

        self.subscriptions.push(SubscriptionHandle {
            topic: topic.clone(),
            txs: vec![tx],
        });

        let properties = SubscribeProperties {
            id: Some(self.subscriptions.len()),
            user_properties: vec![],
        };
        self.client
            .subscribe_with_properties(topic.clone(), QoS::AtLeastOnce, properties)
            .await?;

        Ok(MqttSubscription::new(topic, rx))
    }

    pub fn sender(&self, base_topic: impl Into<String>) -> MqttSender {
        MqttSender::new(self.client.clone(), base_topic)
    }

    //Drives the connection, must be polled for any publish or subscription to make progress
    pub async fn process(mut self) {
        loop {
            match self.event_loop.poll().await {
                Ok(Incoming(Packet::Publish(publish))) => self.dispatch(&publish).await,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("MQTT error: {}", e);
                    //event loop reconnects on next poll, avoid spinning while the broker is down
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    async fn dispatch(&self, publish: &Publish) {
        let msg = match MqttInMessage::try_from(publish) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::error!("Error parsing MQTT message: {}", e);
                return;
            }
        };

        let Some(ids) = publish.properties.as_ref().map(|p| &p.subscription_identifiers) else {
            tracing::error!("No subscription identifiers in MQTT message on {}", msg.topic);
            return;
        };

        for id in ids {
            let Some(subscription) = id.checked_sub(1).and_then(|index| self.subscriptions.get(index)) else {
                tracing::error!("No subscription for id {}", id);
                continue;
            };

            tracing::trace!("Forwarding MQTT message on {} to {}", msg.topic, subscription.topic);

            for tx in subscription.txs.iter() {
                if let Err(e) = tx.send_timeout(msg.clone(), FORWARD_TIMEOUT).await {
                    tracing::error!("Failed to forward MQTT message to subscriber of {}: {}", subscription.topic, e);
                }
            }
        }
    }
}
