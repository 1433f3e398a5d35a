use anyhow::{Context, Result};
use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;
use std::path::Path;

use crate::bot::FailurePolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_api")]
    pub api: String,
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub policy: FailurePolicy,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct LogConfig {
    /// Values above zero add source file and line to every log line.
    #[serde(default)]
    pub caller: i32,
    /// `none` drops timestamps; anything else keeps them.
    #[serde(default)]
    pub time_field: String,
    /// strftime-style timestamp format (e.g. `%Y-%m-%d %H:%M:%S`).
    #[serde(default)]
    pub time_format: String,
}

impl LogConfig {
    pub fn show_caller(&self) -> bool {
        self.caller > 0
    }

    pub fn show_time(&self) -> bool {
        !self.time_field.trim().eq_ignore_ascii_case("none")
    }

    pub fn time_format(&self) -> Option<&str> {
        let format = self.time_format.trim();
        (!format.is_empty()).then_some(format)
    }
}

fn default_port() -> u16 {
    3000
}

fn default_api() -> String {
    "https://api.telegram.org".to_string()
}

fn default_webhook_path() -> String {
    "/telegram".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            token: String::new(),
            api: default_api(),
            webhook_path: default_webhook_path(),
            log: LogConfig::default(),
            policy: FailurePolicy::default(),
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            None => Config::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `lookup` (normally the process environment).
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup("PORT") {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }
        if let Some(token) = lookup("TOKEN") {
            self.token = token;
        }
        if let Some(api) = lookup("API").filter(|v| !v.trim().is_empty()) {
            self.api = api;
        }
        if let Some(path) = lookup("WEBHOOK_PATH").filter(|v| !v.trim().is_empty()) {
            self.webhook_path = path;
        }
        if let Some(caller) = lookup("CALLER") {
            self.log.caller = caller
                .trim()
                .parse()
                .with_context(|| format!("Invalid CALLER value: {}", caller))?;
        }
        if let Some(field) = lookup("TIMEFIELD") {
            self.log.time_field = field;
        }
        if let Some(format) = lookup("TIMEFORMAT") {
            self.log.time_format = format;
        }
        if let Some(flag) = lookup("REPORT_COMMAND_ERRORS") {
            self.policy.report_command_errors = parse_bool("REPORT_COMMAND_ERRORS", &flag)?;
        }
        if let Some(flag) = lookup("REPORT_FALLBACK_SEND_ERRORS") {
            self.policy.report_fallback_send_errors =
                parse_bool("REPORT_FALLBACK_SEND_ERRORS", &flag)?;
        }
        if let Some(policy) = lookup("DECODE_POLICY") {
            self.policy.decode = policy.parse().context("Invalid DECODE_POLICY value")?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            anyhow::bail!("TOKEN is required");
        }
        if !self.webhook_path.starts_with('/') {
            anyhow::bail!(
                "Webhook path must start with '/', got '{}'",
                self.webhook_path
            );
        }
        if let Some(format) = self.log.time_format() {
            if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                anyhow::bail!("Invalid TIMEFORMAT: {}", format);
            }
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("Invalid {} value: {}", key, other),
    }
}
