mod bus;
mod http;
mod monitoring;
mod mqtt;

pub use monitoring::MonitoringConfig;

pub use bus::{EventBus, EventEmitter, EventListener};
pub use http::client::{Authorization, HttpClientConfig};
pub use http::server::HttpServerConfig;
pub use mqtt::{Mqtt, MqttConfig, MqttInMessage, MqttSender, MqttSubscription};

pub mod meter {
    pub use super::monitoring::meter::{increment, set};
}
