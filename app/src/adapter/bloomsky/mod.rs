mod client;

pub use client::{BloomskyClient, StationApiError};

use std::time::Duration;

use serde::Deserialize;

const PRODUCTION_POLL_INTERVAL: Duration = Duration::from_secs(150);
const DEBUG_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize, Clone)]
pub struct Bloomsky {
    //Single word key, BLOOMSKY_APIKEY overrides it as the environment source splits on '_'
    #[serde(default, rename = "apikey")]
    pub api_key: Option<String>,
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_url() -> String {
    "https://api.bloomsky.com/api/skydata/".to_string()
}

fn default_unit() -> String {
    "intl".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Bloomsky {
    pub fn poll_interval(&self, debug: bool) -> Duration {
        match self.poll_interval_secs {
            Some(secs) => Duration::from_secs(secs.max(1)),
            None if debug => DEBUG_POLL_INTERVAL,
            None => PRODUCTION_POLL_INTERVAL,
        }
    }

    //No API key means there is nothing to poll
    pub fn new_client(&self) -> anyhow::Result<Option<BloomskyClient>> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(Some(BloomskyClient::new(
                &self.url,
                &self.unit,
                key,
                Duration::from_secs(self.timeout_secs),
            )?)),
            _ => Ok(None),
        }
    }
}
