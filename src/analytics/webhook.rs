use std::collections::HashMap;

use anyhow::bail;
use async_trait::async_trait;

use crate::config::WebhookConfig;

use super::{Dispatcher, Event};

/// Generic webhook sink: POSTs the whole event as JSON to a user endpoint.
pub struct WebhookDispatcher {
    endpoint: String,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(cfg: &WebhookConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(cfg.timeout).build()?;
        Ok(Self {
            endpoint: cfg.endpoint.clone(),
            headers: cfg.headers.clone(),
            client,
        })
    }
}

#[async_trait]
impl Dispatcher for WebhookDispatcher {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, event: &Event) -> anyhow::Result<()> {
        let mut request = self.client.post(&self.endpoint).json(event);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            bail!("webhook request failed with status: {}", status);
        }
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
