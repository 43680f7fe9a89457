use std::time::Duration;

use derive_more::derive::{Display, Error};
use infrastructure::{Authorization, HttpClientConfig};
use reqwest_middleware::ClientWithMiddleware;
use serde_json::Value;

use crate::station::Station;

#[derive(Debug, Display, Error)]
pub enum StationApiError {
    #[display("Error requesting station data")]
    Transport(reqwest_middleware::Error),

    #[display("Station API rejected request: {detail}")]
    Rejected { detail: String },

    #[display("Station API responded with status {status}")]
    Status { status: u16 },

    #[display("Unexpected station API response")]
    Malformed { source: serde_json::Error },
}

impl From<reqwest_middleware::Error> for StationApiError {
    fn from(value: reqwest_middleware::Error) -> Self {
        StationApiError::Transport(value)
    }
}

#[derive(Debug, Clone)]
pub struct BloomskyClient {
    client: ClientWithMiddleware,
    url: String,
    unit: String,
}

impl BloomskyClient {
    pub fn new(url: &str, unit: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = HttpClientConfig::new(Some(Authorization::Raw(api_key.to_owned())))
            .with_timeout(timeout)
            .new_tracing_client()?;

        Ok(Self {
            client,
            url: url.to_owned(),
            unit: unit.to_owned(),
        })
    }

    #[tracing::instrument(skip(self), fields(url = %self.url))]
    pub async fn get_stations(&self) -> Result<Vec<Station>, StationApiError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("unit", self.unit.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await.map_err(reqwest_middleware::Error::from)?;

        tracing::trace!("Station API responded with {} ({} bytes)", status, body.len());

        parse_stations(status.as_u16(), &body)
    }
}

//An error payload carries a `detail` field, regardless of the status code
fn parse_stations(status: u16, body: &[u8]) -> Result<Vec<Station>, StationApiError> {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) if !(200..300).contains(&status) => return Err(StationApiError::Status { status }),
        Err(e) => return Err(StationApiError::Malformed { source: e }),
    };

    if let Some(detail) = value.get("detail") {
        let detail = match detail {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(StationApiError::Rejected { detail });
    }

    if !(200..300).contains(&status) {
        return Err(StationApiError::Status { status });
    }

    serde_json::from_value(value).map_err(|e| StationApiError::Malformed { source: e })
}
