use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device platform a short code can carry an override URL for.
///
/// The set is closed; unknown tags are rejected when a request is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Macos,
    Web,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Macos => "macos",
            Platform::Web => "web",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            "macos" => Ok(Platform::Macos),
            "web" => Ok(Platform::Web),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Platform-specific target for a short code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceUrl {
    pub platform: Platform,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// A shortened URL as held in the cache and persisted in the `urls` table.
///
/// `device_urls` is `None` until the device rows have been hydrated from the
/// database; `Some` with an empty map means hydration ran and found none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlRecord {
    pub short_code: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_urls: Option<HashMap<Platform, DeviceUrl>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUrlRequest {
    pub url: String,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub expiry_in_secs: Option<i64>,
    pub device_urls: Option<HashMap<Platform, String>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUrlRequest {
    pub url: String,
    pub title: Option<String>,
    pub device_urls: Option<HashMap<Platform, String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trip() {
        for tag in ["android", "ios", "macos", "web"] {
            let platform: Platform = tag.parse().unwrap();
            assert_eq!(platform.as_str(), tag);
        }
        assert!("windows".parse::<Platform>().is_err());
    }

    #[test]
    fn unknown_platform_rejected_in_request() {
        let body = r#"{"url": "https://example.com", "device_urls": {"windows": "https://example.com/win"}}"#;
        assert!(serde_json::from_str::<CreateUrlRequest>(body).is_err());
    }
}
