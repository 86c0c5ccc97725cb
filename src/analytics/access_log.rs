use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::config::AccessLogConfig;

use super::{Dispatcher, Event};

/// Append-only file sink: one JSON line per event.
pub struct AccessLogDispatcher {
    path: String,
    file: Mutex<Option<File>>,
}

impl AccessLogDispatcher {
    pub async fn new(cfg: &AccessLogConfig) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.path)
            .await
            .with_context(|| format!("failed to open access log: {}", cfg.path))?;

        Ok(Self {
            path: cfg.path.clone(),
            file: Mutex::new(Some(file)),
        })
    }
}

#[async_trait]
impl Dispatcher for AccessLogDispatcher {
    fn name(&self) -> &'static str {
        "accesslog"
    }

    async fn send(&self, event: &Event) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut guard = self.file.lock().await;
        match guard.as_mut() {
            Some(file) => {
                file.write_all(line.as_bytes())
                    .await
                    .with_context(|| format!("failed to write access log: {}", self.path))?;
                Ok(())
            }
            None => bail!("access log is closed"),
        }
    }

    async fn close(&self) -> anyhow::Result<()> {
        if let Some(mut file) = self.file.lock().await.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}
