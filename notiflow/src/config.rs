//! Client configuration.
//!
//! Supported env vars:
//! - `NOTIFLOW_BACKEND_URL`, `NOTIFLOW_TOKEN`, `NOTIFLOW_HTTP_TIMEOUT_SECS`
//! - `NOTIFLOW_PUSH_URL`, `NOTIFLOW_PUSH_ENABLED`
//! - `NOTIFLOW_POLL_INTERVAL_SECS`
//! - `NOTIFLOW_RECONNECT_INITIAL_MS`, `NOTIFLOW_RECONNECT_MAX_MS`
//! - `NOTIFLOW_MAX_VISIBLE_TOASTS`, `NOTIFLOW_TOAST_DURATION_MS`

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::backend::BackendConfig;
use crate::channel::ChannelConfig;
use crate::toast::ToastConfig;
use crate::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotiflowConfig {
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub toast: ToastConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

impl NotiflowConfig {
    /// Defaults overridden by `NOTIFLOW_*` environment variables, validated.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`NotiflowConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(url) = var("NOTIFLOW_BACKEND_URL") {
            config.backend.base_url = url;
        }
        if let Some(token) = var("NOTIFLOW_TOKEN") {
            config.backend.token = Some(token);
        }
        if let Some(timeout) = var("NOTIFLOW_HTTP_TIMEOUT_SECS") {
            config.backend.timeout_secs = parse("NOTIFLOW_HTTP_TIMEOUT_SECS", &timeout)?;
        }

        config.channel.push_url = var("NOTIFLOW_PUSH_URL");
        config.channel.push_enabled = match var("NOTIFLOW_PUSH_ENABLED") {
            Some(flag) => parse_bool("NOTIFLOW_PUSH_ENABLED", &flag)?,
            None => config.channel.push_url.is_some(),
        };
        if let Some(secs) = var("NOTIFLOW_POLL_INTERVAL_SECS") {
            config.channel.poll_interval_secs = parse("NOTIFLOW_POLL_INTERVAL_SECS", &secs)?;
        }
        if let Some(ms) = var("NOTIFLOW_RECONNECT_INITIAL_MS") {
            config.channel.backoff.initial_delay_ms = parse("NOTIFLOW_RECONNECT_INITIAL_MS", &ms)?;
        }
        if let Some(ms) = var("NOTIFLOW_RECONNECT_MAX_MS") {
            config.channel.backoff.max_delay_ms = parse("NOTIFLOW_RECONNECT_MAX_MS", &ms)?;
        }

        if let Some(max) = var("NOTIFLOW_MAX_VISIBLE_TOASTS") {
            config.toast.max_visible = parse("NOTIFLOW_MAX_VISIBLE_TOASTS", &max)?;
        }
        if let Some(ms) = var("NOTIFLOW_TOAST_DURATION_MS") {
            config.toast.default_duration_ms = parse("NOTIFLOW_TOAST_DURATION_MS", &ms)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.toast.max_visible == 0 {
            return Err(Error::config("max visible toasts must be at least 1"));
        }
        if self.toast.default_duration_ms == 0 {
            return Err(Error::config("toast duration must be positive"));
        }
        if self.channel.poll_interval_secs == 0 {
            return Err(Error::config("poll interval must be at least 1 second"));
        }
        if self.channel.push_enabled && self.channel.push_url.is_none() {
            return Err(Error::config("push is enabled but no push URL is set"));
        }
        let backoff = &self.channel.backoff;
        if backoff.initial_delay_ms == 0 || backoff.max_delay_ms < backoff.initial_delay_ms {
            return Err(Error::config(format!(
                "invalid reconnect backoff: initial {}ms, max {}ms",
                backoff.initial_delay_ms, backoff.max_delay_ms
            )));
        }
        if self.backend.base_url.trim().is_empty() {
            return Err(Error::config("backend URL is empty"));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::config(format!("{key}={value}: {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(format!("{key}={value}: expected a boolean"))),
    }
}
