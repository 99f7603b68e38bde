//! HTTP client for the registration heartbeat.

use std::time::Duration;

use deviot_common::GatewayRegistration;
use reqwest::Client;

use crate::error::{Error, Result};

/// Posts [`GatewayRegistration`] bodies to the registration endpoint.
pub struct RegistrationClient {
    http_client: Client,
    url: String,
}

impl RegistrationClient {
    /// `timeout` bounds both connecting and the whole request.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one registration. Any status below 300 is success.
    pub async fn register(&self, registration: &GatewayRegistration) -> Result<()> {
        let response = self
            .http_client
            .post(&self.url)
            .json(registration)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() < 300 {
            Ok(())
        } else {
            Err(Error::Registration(format!("{} answered {}", self.url, status)))
        }
    }
}
