//! Delivery of a routed event to its resolved endpoint.

use crate::directory::Endpoint;
use crate::event::{RouteError, RoutedEvent};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Header carrying the original message type.
pub const EVENT_TYPE_HEADER: &str = "x-event-type";

#[async_trait]
pub trait EventForwarder: Send + Sync {
    async fn forward(&self, endpoint: &Endpoint, event: &RoutedEvent) -> Result<(), RouteError>;
}

/// POSTs the event payload as JSON.
pub struct HttpForwarder {
    client: Client,
}

impl HttpForwarder {
    pub fn new(timeout: Duration) -> Result<Self, RouteError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| RouteError::Forward(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EventForwarder for HttpForwarder {
    async fn forward(&self, endpoint: &Endpoint, event: &RoutedEvent) -> Result<(), RouteError> {
        let response = self
            .client
            .post(endpoint.url())
            .header(EVENT_TYPE_HEADER, &event.message_type)
            .json(&event.payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    RouteError::Forward(format!("cannot connect to {}", endpoint))
                } else {
                    RouteError::Forward(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RouteError::Forward(format!("{} answered {}", endpoint, status)));
        }
        Ok(())
    }
}
