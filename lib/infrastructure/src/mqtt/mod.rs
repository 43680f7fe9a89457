mod client;
mod sender;
mod subscription;

pub use client::Mqtt;
pub use sender::MqttSender;
pub use subscription::{MqttInMessage, MqttSubscription};

use std::time::Duration;

use rumqttc::v5::MqttOptions;
use rumqttc::v5::mqttbytes::v5::ConnectProperties;
use serde::Deserialize;

const KEEP_ALIVE: Duration = Duration::from_secs(5);
const SESSION_EXPIRY_SECS: u32 = 60;
const MAX_PACKET_SIZE: u32 = 1024 * 1024;

#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    host: String,
    port: u16,
    client_id: String,
    #[serde(default)]
    credentials: Option<MqttCredentials>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MqttCredentials {
    username: String,
    password: String,
}

impl MqttConfig {
    pub fn new_client(&self) -> Mqtt {
        Mqtt::new(self.options())
    }

    //Persistent session, subscriptions survive short broker outages
    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_start(false);

        if let Some(credentials) = &self.credentials {
            options.set_credentials(&credentials.username, &credentials.password);
        }

        let mut connect_props = ConnectProperties::new();
        connect_props.session_expiry_interval = Some(SESSION_EXPIRY_SECS);
        connect_props.max_packet_size = Some(MAX_PACKET_SIZE);
        options.set_connect_properties(connect_props);

        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(credentials: Option<MqttCredentials>) -> MqttConfig {
        MqttConfig {
            host: "broker".to_string(),
            port: 1883,
            client_id: "skybridge".to_string(),
            credentials,
        }
    }

    #[test]
    fn test_options_keep_session() {
        let options = config(None).options();

        assert_eq!(options.broker_address(), ("broker".to_string(), 1883));
        assert_eq!(options.client_id(), "skybridge");
        assert!(!options.clean_start());
        assert!(options.credentials().is_none());
    }

    #[test]
    fn test_options_with_credentials() {
        let options = config(Some(MqttCredentials {
            username: "bridge".to_string(),
            password: "secret".to_string(),
        }))
        .options();

        assert!(options.credentials().is_some());
    }
}
