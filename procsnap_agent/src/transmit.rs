//! HTTP delivery of snapshots to the collector.

use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

use crate::types::Snapshot;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum TransmitError {
    /// Connection refused, DNS failure, timeout. Retried on the next cycle only.
    #[error("delivery failed: {0}")]
    Transient(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Accepted { status: StatusCode },
    Rejected {
        status: StatusCode,
        body: String,
    },
}

pub struct Transmitter {
    client: Client,
    url: String,
    auth: String,
}

impl Transmitter {
    pub fn new(url: impl Into<String>, api_key: &str) -> Result<Self, TransmitError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("procsnap_agent/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            auth: format!("Token {api_key}"),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn send(&self, snapshot: &Snapshot) -> Result<Delivery, TransmitError> {
        let resp = self
            .client
            .post(&self.url)
            .header(header::AUTHORIZATION, &self.auth)
            .json(snapshot)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(Delivery::Accepted { status });
        }
        let body = resp.text().await.unwrap_or_default();
        Ok(Delivery::Rejected { status, body })
    }
}
