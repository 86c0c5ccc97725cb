use anyhow::bail;
use async_trait::async_trait;
use reqwest::header;
use serde::Serialize;

use crate::config::PlausibleConfig;

use super::{Dispatcher, Event};

/// Plausible Analytics events API sink.
pub struct PlausibleDispatcher {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct PlausiblePayload<'a> {
    name: &'a str,
    domain: &'a str,
    url: &'a str,
    referrer: &'a str,
}

impl PlausibleDispatcher {
    pub fn new(cfg: &PlausibleConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(cfg.timeout).build()?;
        Ok(Self {
            endpoint: cfg.endpoint.clone(),
            client,
        })
    }
}

#[async_trait]
impl Dispatcher for PlausibleDispatcher {
    fn name(&self) -> &'static str {
        "plausible"
    }

    async fn send(&self, event: &Event) -> anyhow::Result<()> {
        let payload = PlausiblePayload {
            name: &event.name,
            domain: &event.domain,
            url: &event.url,
            referrer: &event.referrer,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(header::USER_AGENT, event.user_agent.as_str())
            .header("X-Forwarded-For", event.user_ip.as_str())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            bail!("plausible request failed with status: {}", status);
        }
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
