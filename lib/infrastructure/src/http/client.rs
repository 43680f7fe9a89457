use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::{self, HeaderMap};
use reqwest_middleware::ClientWithMiddleware;
use reqwest_tracing::TracingMiddleware;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "scheme", content = "token", rename_all = "snake_case")]
pub enum Authorization {
    Bearer(String),
    //Sent as-is, without scheme prefix
    Raw(String),
}

impl Authorization {
    fn header_value(&self) -> String {
        match self {
            Authorization::Bearer(token) => format!("Bearer {}", token),
            Authorization::Raw(token) => token.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HttpClientConfig {
    authorization: Option<Authorization>,
    timeout_secs: Option<u64>,
}

impl HttpClientConfig {
    pub fn new(authorization: Option<Authorization>) -> Self {
        Self {
            authorization,
            timeout_secs: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs());
        self
    }

    pub fn new_tracing_client(&self) -> anyhow::Result<ClientWithMiddleware> {
        let mut headers = HeaderMap::new();

        if let Some(authorization) = &self.authorization {
            let mut auth_value = header::HeaderValue::from_str(&authorization.header_value())
                .context("Authorization value is not a valid header value")?;
            auth_value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, auth_value);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let client = builder.build()?;

        Ok(reqwest_middleware::ClientBuilder::new(client)
            .with(TracingMiddleware::default())
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_authorization_has_no_scheme() {
        assert_eq!(Authorization::Raw("abc123".to_string()).header_value(), "abc123");
        assert_eq!(Authorization::Bearer("abc123".to_string()).header_value(), "Bearer abc123");
    }

    #[test]
    fn test_invalid_header_value_is_rejected() {
        let config = HttpClientConfig::new(Some(Authorization::Raw("line\nbreak".to_string())));
        assert!(config.new_tracing_client().is_err());
    }
}
