//! reqwest-backed notification backend.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{NotificationBackend, NotificationPage};
use crate::{Error, Result};

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the notification API, e.g. `https://api.example.com/v1/`.
    pub base_url: String,
    /// Bearer token for the session.
    #[serde(default)]
    pub token: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    15
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/".to_string(),
            token: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Notification backend over HTTP.
pub struct HttpBackend {
    base_url: Url,
    token: Option<String>,
    client: Client,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        install_rustls_provider();
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Self::with_client(config, client)
    }

    pub fn with_client(config: &BackendConfig, client: Client) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(&config.base_url)?,
            token: config.token.clone().filter(|t| !t.is_empty()),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = self.authorize(builder).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::backend(status.as_u16(), truncate(&body, 200)))
    }
}

/// reqwest is built without a bundled crypto provider; install aws-lc-rs once.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Ensure the base URL ends with `/` so `Url::join` appends instead of replacing.
fn normalize_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::config("backend base URL is empty"));
    }
    if trimmed.ends_with('/') {
        Ok(Url::parse(trimmed)?)
    } else {
        Ok(Url::parse(&format!("{trimmed}/"))?)
    }
}

fn truncate(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &input[..idx]),
        None => input.to_string(),
    }
}

#[async_trait]
impl NotificationBackend for HttpBackend {
    async fn fetch_notifications(&self, since: Option<DateTime<Utc>>) -> Result<NotificationPage> {
        let mut url = self.endpoint("notifications")?;
        if let Some(since) = since {
            url.query_pairs_mut()
                .append_pair("since", &since.to_rfc3339_opts(SecondsFormat::Millis, true));
        }

        debug!(%url, "Fetching notifications");
        let page = self
            .send(self.client.get(url))
            .await?
            .json::<NotificationPage>()
            .await?;
        Ok(page)
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&format!("notifications/{}/read", encode_segment(id)))?;
        self.send(self.client.post(url)).await?;
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<()> {
        let url = self.endpoint("notifications/read-all")?;
        self.send(self.client.post(url)).await?;
        Ok(())
    }

    async fn react(&self, id: &str, payload: &Value) -> Result<()> {
        let url = self.endpoint(&format!("notifications/{}/reactions", encode_segment(id)))?;
        self.send(self.client.post(url).json(payload)).await?;
        Ok(())
    }
}

/// Percent-encode an opaque id for use as a single path segment.
fn encode_segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_trailing_slash() {
        let backend = HttpBackend::new(&BackendConfig {
            base_url: "https://api.example.com/v1".to_string(),
            token: Some(String::new()),
            timeout_secs: 5,
        })
        .unwrap();

        assert_eq!(
            backend.endpoint("notifications").unwrap().as_str(),
            "https://api.example.com/v1/notifications"
        );
        assert!(backend.token.is_none());
    }

    #[test]
    fn empty_base_url_is_a_config_error() {
        let result = HttpBackend::new(&BackendConfig {
            base_url: "  ".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn ids_are_encoded_as_one_segment() {
        assert_eq!(encode_segment("abc"), "abc");
        assert_eq!(encode_segment("a/b c"), "a%2Fb%20c");
    }

    #[test]
    fn truncates_long_bodies() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 4), "abcd...");
    }
}
