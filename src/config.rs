use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "CONTACT_RELAY_CONFIG";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub smtp: SmtpConfig,
    pub twilio: TwilioConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmtpConfig {
    pub username: String,
    pub password: String,
    pub from: String,
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_subject")]
    pub subject: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_phone: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_bind() -> String { "0.0.0.0:8080".to_string() }
fn default_db_path() -> String { "./contact-relay.db".to_string() }
fn default_server() -> String { "smtp.gmail.com".to_string() }
fn default_port() -> u16 { 587 }
fn default_subject() -> String { "Notificación de Registro".to_string() }
fn default_api_base() -> String { "https://api.twilio.com".to_string() }

/// Load config from a TOML file path.
pub fn load_from(path: &str) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {path}"))?;
    parse(&text)
}

/// Load config from `$CONTACT_RELAY_CONFIG`, falling back to `config.toml`.
pub fn load() -> Result<Config> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "config.toml".to_string());
    load_from(&path)
}

pub fn parse(text: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(text).context("Failed to parse TOML config")?;
    Ok(cfg)
}
