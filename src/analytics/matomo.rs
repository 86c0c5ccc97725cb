use anyhow::bail;
use async_trait::async_trait;
use chrono::Utc;

use crate::config::MatomoConfig;

use super::{Dispatcher, Event};

/// Matomo HTTP tracking API sink.
pub struct MatomoDispatcher {
    config: MatomoConfig,
    client: reqwest::Client,
}

impl MatomoDispatcher {
    pub fn new(cfg: &MatomoConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(cfg.timeout).build()?;
        Ok(Self {
            config: cfg.clone(),
            client,
        })
    }
}

#[async_trait]
impl Dispatcher for MatomoDispatcher {
    fn name(&self) -> &'static str {
        "matomo"
    }

    async fn send(&self, event: &Event) -> anyhow::Result<()> {
        let short_url = format!("https://{}/{}", event.domain, event.short_code);
        let mut params: Vec<(&str, String)> = vec![
            ("idsite", self.config.site_id.to_string()),
            ("rec", "1".to_string()),
            ("apiv", "1".to_string()),
            ("url", short_url),
            (
                "action_name",
                format!("Redirect to: {}", event.target_url),
            ),
            ("e_c", "Shortlink".to_string()),
            ("e_a", "Redirect".to_string()),
            ("e_n", event.short_code.clone()),
            ("urlref", event.referrer.clone()),
            ("ua", event.user_agent.clone()),
            // Cache-buster, same role as a nonce.
            (
                "rand",
                Utc::now().timestamp_nanos_opt().unwrap_or_default().to_string(),
            ),
        ];

        // Matomo only honors a caller-supplied client IP with an auth token.
        if let Some(token) = &self.config.auth_token {
            if !event.user_ip.is_empty() {
                params.push(("cip", event.user_ip.clone()));
            }
            params.push(("token_auth", token.clone()));
        }

        let response = self
            .client
            .get(&self.config.tracking_url)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "matomo request failed with status: {}, response: {}",
                status,
                body
            );
        }
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
