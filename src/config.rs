//! Widget configuration parsed from environment variables.

use std::time::Duration;

use reqwest::Url;

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

pub const DEFAULT_API_BASE: &str = "http://localhost:5000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RENDER_DEBOUNCE_MS: u64 = 80;
pub const DEFAULT_GREETING: &str = "Hi! I'm AIDA, your Advantis Assistant. How can I help you today?";
pub const DEFAULT_WIDGET_URL: &str = bridge::embed::DEFAULT_WIDGET_URL;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var} `{value}`: {reason}")]
    InvalidUrl { var: &'static str, value: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request: Duration,
    pub connect: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Backend base URL without a trailing slash.
    pub api_base: String,
    pub timeouts: Timeouts,
    pub render_debounce: Duration,
    /// Opening assistant turn; `None` starts with an empty transcript.
    pub greeting: Option<String>,
    /// Where the host shell says the widget is served from.
    pub widget_url: String,
}

impl Config {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `AIDA_API_BASE`: backend base URL, default `http://localhost:5000`
    /// - `AIDA_REQUEST_TIMEOUT_SECS`: one-shot call timeout, default 60
    /// - `AIDA_CONNECT_TIMEOUT_SECS`: default 10
    /// - `AIDA_RENDER_DEBOUNCE_MS`: streaming re-render debounce, default 80
    /// - `AIDA_GREETING`: opening assistant turn; empty disables it
    /// - `AIDA_WIDGET_URL`: widget location reported to the host
    ///
    /// # Errors
    ///
    /// Returns an error if a URL variable is not an absolute http(s) URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an injectable variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL variable is not an absolute http(s) URL.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_base = lookup("AIDA_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_owned());
        let api_base = parse_base_url("AIDA_API_BASE", &api_base)?;
        let widget_url = lookup("AIDA_WIDGET_URL").unwrap_or_else(|| DEFAULT_WIDGET_URL.to_owned());
        let widget_url = parse_base_url("AIDA_WIDGET_URL", &widget_url)?;

        let timeouts = Timeouts {
            request: Duration::from_secs(parse_or(&lookup, "AIDA_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)),
            connect: Duration::from_secs(parse_or(&lookup, "AIDA_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)),
        };
        let render_debounce =
            Duration::from_millis(parse_or(&lookup, "AIDA_RENDER_DEBOUNCE_MS", DEFAULT_RENDER_DEBOUNCE_MS));

        let greeting = match lookup("AIDA_GREETING") {
            Some(text) if text.trim().is_empty() => None,
            Some(text) => Some(text),
            None => Some(DEFAULT_GREETING.to_owned()),
        };

        Ok(Self { api_base, timeouts, render_debounce, greeting, widget_url })
    }

    /// Replace the backend base URL (CLI override).
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not an absolute http(s) URL.
    pub fn with_api_base(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.api_base = parse_base_url("--api-base", raw)?;
        Ok(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_owned(),
            timeouts: Timeouts {
                request: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
                connect: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            },
            render_debounce: Duration::from_millis(DEFAULT_RENDER_DEBOUNCE_MS),
            greeting: Some(DEFAULT_GREETING.to_owned()),
            widget_url: DEFAULT_WIDGET_URL.to_owned(),
        }
    }
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_base_url(var: &'static str, raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let invalid = |reason: String| ConfigError::InvalidUrl { var, value: raw.to_owned(), reason };
    let url = Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
    }
    Ok(trimmed.to_owned())
}
