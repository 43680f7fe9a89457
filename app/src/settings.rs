use config::{Config, ConfigError, Environment, File};
use infrastructure::{HttpServerConfig, MonitoringConfig, MqttConfig};
use serde::Deserialize;

use crate::adapter::bloomsky::Bloomsky;
use crate::adapter::homebridge::Homebridge;
use crate::camera::CameraConfig;

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub debug: bool,
    pub bloomsky: Bloomsky,
    #[serde(default)]
    pub camera: CameraConfig,
    pub mqtt: MqttConfig,
    pub homebridge: Homebridge,
    pub http_server: HttpServerConfig,
    pub monitoring: MonitoringConfig,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(File::with_name("config.toml"), environment())
    }

    fn load(file: File<config::FileSourceFile, config::FileFormat>, env: Environment) -> Result<Self, ConfigError> {
        let builder = Config::builder().add_source(file).add_source(env);

        let s = builder.build()?;
        s.try_deserialize()
    }
}

fn environment() -> Environment {
    Environment::default().separator("_").list_separator(",")
}
