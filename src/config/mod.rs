use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context};

#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub app: AppConfig,
    pub server: ServerConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file
    pub path: String,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub conn_max_lifetime_mins: u64,
    /// Number of buffered creates that force a flush
    pub buffer_size: usize,
    /// Interval between timed flushes of the write buffer
    pub flush_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Length of generated short codes
    pub short_url_length: usize,
    /// Public base URL returned to API callers and reported to analytics
    pub public_url: String,
    pub enable_debug_logs: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub enabled: bool,
    pub num_workers: usize,
    pub providers: Vec<ProviderConfig>,
}

/// Per-provider analytics configuration.
///
/// Parsed eagerly so that a misconfigured provider fails startup instead of
/// surfacing on the first tracked event.
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Plausible(PlausibleConfig),
    Matomo(MatomoConfig),
    Webhook(WebhookConfig),
    AccessLog(AccessLogConfig),
}

#[derive(Debug, Clone)]
pub struct PlausibleConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MatomoConfig {
    pub tracking_url: String,
    pub site_id: i64,
    pub auth_token: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct AccessLogConfig {
    pub path: String,
}

impl DbConfig {
    const fn default_max_open_conns() -> u32 {
        10
    }

    const fn default_max_idle_conns() -> u32 {
        5
    }

    const fn default_conn_max_lifetime_mins() -> u64 {
        30
    }

    const fn default_buffer_size() -> usize {
        5000
    }

    const fn default_flush_interval_ms() -> u64 {
        500
    }
}

impl AppConfig {
    const fn default_short_url_length() -> usize {
        6
    }
}

impl AnalyticsConfig {
    const fn default_num_workers() -> usize {
        2
    }

    const fn default_timeout_secs() -> u64 {
        5
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let db = DbConfig {
            path: env_string("DB_PATH", "shrike.db"),
            max_open_conns: env_parse("DB_MAX_OPEN_CONNS", DbConfig::default_max_open_conns()),
            max_idle_conns: env_parse("DB_MAX_IDLE_CONNS", DbConfig::default_max_idle_conns()),
            conn_max_lifetime_mins: env_parse(
                "DB_CONN_MAX_LIFETIME_MINS",
                DbConfig::default_conn_max_lifetime_mins(),
            ),
            buffer_size: env_parse("DB_BUFFER_SIZE", DbConfig::default_buffer_size()).max(1),
            flush_interval: Duration::from_millis(
                env_parse("DB_FLUSH_INTERVAL_MS", DbConfig::default_flush_interval_ms()).max(1),
            ),
        };

        let server = ServerConfig {
            host: env_string("SERVER_HOST", "127.0.0.1"),
            port: env_parse("SERVER_PORT", 7000u16),
        };

        let public_url = env_string(
            "APP_PUBLIC_URL",
            &format!("http://{}:{}", server.host, server.port),
        )
        .trim_end_matches('/')
        .to_string();

        let app = AppConfig {
            short_url_length: env_parse(
                "APP_SHORT_URL_LENGTH",
                AppConfig::default_short_url_length(),
            )
            .max(1),
            public_url,
            enable_debug_logs: env_bool("APP_ENABLE_DEBUG_LOGS"),
        };

        let analytics = Self::analytics_from_env()?;

        Ok(Config {
            db,
            app,
            server,
            analytics,
        })
    }

    fn analytics_from_env() -> anyhow::Result<AnalyticsConfig> {
        let enabled = env_bool("ANALYTICS_ENABLED");
        if !enabled {
            return Ok(AnalyticsConfig {
                enabled: false,
                num_workers: AnalyticsConfig::default_num_workers(),
                providers: Vec::new(),
            });
        }

        let num_workers = env_parse(
            "ANALYTICS_NUM_WORKERS",
            AnalyticsConfig::default_num_workers(),
        )
        .max(1);

        let selected = std::env::var("ANALYTICS_PROVIDERS").unwrap_or_default();
        let mut providers = Vec::new();
        for name in selected
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            providers.push(Self::provider_from_env(name)?);
        }

        Ok(AnalyticsConfig {
            enabled,
            num_workers,
            providers,
        })
    }

    fn provider_from_env(name: &str) -> anyhow::Result<ProviderConfig> {
        match name {
            "plausible" => {
                let endpoint = std::env::var("ANALYTICS_PLAUSIBLE_ENDPOINT")
                    .context("ANALYTICS_PLAUSIBLE_ENDPOINT must be set for the plausible provider")?;
                if endpoint.is_empty() {
                    bail!("plausible endpoint is required");
                }
                Ok(ProviderConfig::Plausible(PlausibleConfig {
                    endpoint,
                    timeout: Duration::from_secs(
                        env_parse(
                            "ANALYTICS_PLAUSIBLE_TIMEOUT_SECS",
                            AnalyticsConfig::default_timeout_secs(),
                        )
                        .max(1),
                    ),
                }))
            }
            "matomo" => {
                let tracking_url = std::env::var("ANALYTICS_MATOMO_TRACKING_URL")
                    .context("ANALYTICS_MATOMO_TRACKING_URL must be set for the matomo provider")?;
                if tracking_url.is_empty() {
                    bail!("matomo tracking_url is required");
                }
                let site_id: i64 = std::env::var("ANALYTICS_MATOMO_SITE_ID")
                    .context("ANALYTICS_MATOMO_SITE_ID must be set for the matomo provider")?
                    .parse()
                    .context("ANALYTICS_MATOMO_SITE_ID must be an integer")?;
                if site_id == 0 {
                    bail!("matomo site_id is required");
                }
                Ok(ProviderConfig::Matomo(MatomoConfig {
                    tracking_url,
                    site_id,
                    auth_token: std::env::var("ANALYTICS_MATOMO_AUTH_TOKEN")
                        .ok()
                        .filter(|v| !v.is_empty()),
                    timeout: Duration::from_secs(
                        env_parse(
                            "ANALYTICS_MATOMO_TIMEOUT_SECS",
                            AnalyticsConfig::default_timeout_secs(),
                        )
                        .max(1),
                    ),
                }))
            }
            "webhook" => {
                let endpoint = std::env::var("ANALYTICS_WEBHOOK_ENDPOINT")
                    .context("ANALYTICS_WEBHOOK_ENDPOINT must be set for the webhook provider")?;
                if endpoint.is_empty() {
                    bail!("webhook endpoint is required");
                }
                Ok(ProviderConfig::Webhook(WebhookConfig {
                    endpoint,
                    timeout: Duration::from_secs(
                        env_parse(
                            "ANALYTICS_WEBHOOK_TIMEOUT_SECS",
                            AnalyticsConfig::default_timeout_secs(),
                        )
                        .max(1),
                    ),
                    headers: parse_header_list(
                        &std::env::var("ANALYTICS_WEBHOOK_HEADERS").unwrap_or_default(),
                    ),
                }))
            }
            "accesslog" => {
                let path = std::env::var("ANALYTICS_ACCESSLOG_PATH")
                    .context("ANALYTICS_ACCESSLOG_PATH must be set for the accesslog provider")?;
                if path.is_empty() {
                    bail!("accesslog path is required");
                }
                Ok(ProviderConfig::AccessLog(AccessLogConfig { path }))
            }
            other => bail!("unknown analytics provider: {}", other),
        }
    }
}

/// Parse `Name=Value,Other=Value` pairs; malformed entries are skipped.
fn parse_header_list(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() || value.is_empty() {
                return None;
            }
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_list_parsing() {
        let headers = parse_header_list("Authorization=Bearer abc, X-Custom=1,broken");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["Authorization"], "Bearer abc");
        assert_eq!(headers["X-Custom"], "1");
    }

    #[test]
    fn header_list_empty() {
        assert!(parse_header_list("").is_empty());
    }
}
