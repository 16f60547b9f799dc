use std::env;

use anyhow::Context;
use chrono::Duration;

/// Process configuration, read once at start-up and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub mongo_uri: String,
    pub database: String,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub host: String,
    pub port: u16,
    pub media: Option<MediaConfig>,
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name).with_context(|| format!("{} must be set", name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

impl Config {
    pub fn from_env(default_port: u16) -> anyhow::Result<Self> {
        let token_ttl_days = match optional("TOKEN_TTL_DAYS") {
            Some(days) => days.parse::<i64>().context("TOKEN_TTL_DAYS must be an integer")?,
            None => 7,
        };

        let port = match optional("PORT") {
            Some(port) => port.parse::<u16>().context("PORT must be a valid port number")?,
            None => default_port,
        };

        let media = match optional("CLOUDINARY_CLOUD_NAME") {
            Some(cloud_name) => Some(MediaConfig {
                cloud_name,
                api_key: required("CLOUDINARY_API_KEY")?,
                api_secret: required("CLOUDINARY_API_SECRET")?,
                folder: optional("CLOUDINARY_FOLDER").unwrap_or_else(|| "civic-issues".to_string()),
            }),
            None => None,
        };

        Ok(Config {
            mongo_uri: required("MONGOURI")?,
            database: optional("MONGO_DATABASE").unwrap_or_else(|| "civic".to_string()),
            jwt_secret: required("JWT_SECRET")?,
            token_ttl: Duration::days(token_ttl_days),
            host: optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            media,
        })
    }
}
