//! HTTP client for channel creation and producing.

use std::time::Duration;

use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("invalid relay URL: {0}")]
    InvalidUrl(String),
    #[error("relay answered {status}: {body}")]
    Status { status: u16, body: String },
}

/// Body of a `201` from `POST /channels`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedChannel {
    pub channel_id: String,
    pub token: String,
    pub live_tail: bool,
}

/// Body of a `202` from `POST /channels/:id/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceResult {
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub struct RelayClient {
    client: Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .connect_timeout(Duration::from_secs(2))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn create_channel(&self, correlation_id: Option<&str>) -> Result<CreatedChannel, ClientError> {
        let mut request = self.client.post(format!("{}/channels", self.base_url));
        if let Some(id) = correlation_id {
            request = request.json(&serde_json::json!({ "correlation_id": id }));
        }
        let response = request.send().await.map_err(|e| self.connect_error(e))?;
        Ok(expect_success(response).await?.json().await?)
    }

    pub async fn produce(&self, channel_id: &str, message: impl Into<String>) -> Result<ProduceResult, ClientError> {
        let response = self
            .client
            .post(self.messages_url(channel_id)?)
            .body(message.into())
            .send()
            .await
            .map_err(|e| self.connect_error(e))?;
        Ok(expect_success(response).await?.json().await?)
    }

    /// `{base}/channels/{id}/messages` with the id escaped as one segment.
    fn messages_url(&self, channel_id: &str) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["channels", channel_id, "messages"]);
        Ok(url)
    }

    fn connect_error(&self, e: reqwest::Error) -> ClientError {
        if e.is_connect() {
            ClientError::Connection(format!("Cannot connect to {}", self.base_url))
        } else {
            ClientError::Http(e)
        }
    }
}

async fn expect_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}
