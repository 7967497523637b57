//! HTTP transport: the `(EventUrl, EventResponse)` stage.
//!
//! One POST per request. Transient failures (connection errors, timeouts,
//! 5xx) are retried here with doubling delays; everything else fails at
//! once. Redirects are never followed and count as failures.

use crate::{SenderError, SenderResult};
use async_trait::async_trait;
use component_registry::{
    ComponentModule, ComponentRegistry, DataFetcher, FnLoaderFactory, LoadData, ModelLoader,
};
use event_model::{EventResponse, EventUrl};
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect, Client};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    /// Bound on the whole request once connected.
    pub read_timeout: Duration,
    /// Extra attempts after the first for transient failures.
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each following one.
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            max_retries: 2,
            retry_delay: Duration::from_millis(200),
            max_retry_delay: Duration::from_secs(5),
        }
    }
}

/// HTTP client for the collection endpoint.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> SenderResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.connect_timeout + config.read_timeout)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Deliver `request`, retrying transient failures.
    pub async fn execute(&self, request: &EventUrl) -> SenderResult<u16> {
        let mut attempt = 0u32;
        let mut delay = self.config.retry_delay;

        loop {
            attempt += 1;
            match self.try_execute(request).await {
                Ok(status) => return Ok(status),
                Err(e) if e.is_transient() && attempt <= self.config.max_retries => {
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Send failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, self.config.max_retry_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Single attempt.
    async fn try_execute(&self, request: &EventUrl) -> SenderResult<u16> {
        let url = request.url();
        debug!(url = %url, bytes = request.body.len(), "Sending events");

        let mut builder = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, request.media_type.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.body(request.body.clone()).send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(status.as_u16())
        } else if status.is_redirection() {
            Err(SenderError::Redirect(status.as_u16()))
        } else {
            Err(SenderError::Status(status.as_u16()))
        }
    }
}

impl ModelLoader<EventUrl, EventResponse> for HttpTransport {
    fn build_load_data(&self, model: EventUrl) -> LoadData<EventResponse> {
        LoadData::new(TransportFetcher {
            transport: self.clone(),
            request: Some(model),
        })
    }
}

struct TransportFetcher {
    transport: HttpTransport,
    request: Option<EventUrl>,
}

#[async_trait]
impl DataFetcher<EventResponse> for TransportFetcher {
    /// Cancelled by dropping the future; the worker never sees a response
    /// from a dropped send.
    async fn execute_data(&mut self) -> EventResponse {
        let Some(request) = self.request.take() else {
            return EventResponse::failed(None);
        };

        match self.transport.execute(&request).await {
            Ok(status) => {
                info!(status, bytes = request.body.len(), "Events delivered");
                EventResponse {
                    succeeded: true,
                    status: Some(status),
                    used_bytes: request.body.len() as u64,
                }
            }
            Err(e) => {
                let status = match &e {
                    SenderError::Status(s) | SenderError::Redirect(s) => Some(*s),
                    _ => None,
                };
                warn!(error = %e, "Events not delivered");
                EventResponse::failed(status)
            }
        }
    }
}

/// Installs the HTTP transport.
pub struct HttpTransportModule {
    transport: HttpTransport,
}

impl HttpTransportModule {
    pub fn new(config: TransportConfig) -> SenderResult<Self> {
        Ok(Self {
            transport: HttpTransport::new(config)?,
        })
    }
}

impl ComponentModule for HttpTransportModule {
    fn register_components(&self, registry: &ComponentRegistry) {
        let loader: Arc<dyn ModelLoader<EventUrl, EventResponse>> =
            Arc::new(self.transport.clone());
        registry.register::<EventUrl, EventResponse, _>(FnLoaderFactory::new(loader));
    }
}
