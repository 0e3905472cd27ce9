use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid value for {key}: {value:?}")]
pub struct ConfigError {
    key: &'static str,
    value: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub secure_cookies: bool,
    pub page_size: u32,
    pub heatmap_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/hashnote.db".to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            secure_cookies: false,
            page_size: 10,
            heatmap_days: 84,
        }
    }
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").unwrap_or(defaults.database_url);

        let bind_addr = match get("BIND_ADDR") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError { key: "BIND_ADDR", value })?,
            None => defaults.bind_addr,
        };

        let secure_cookies = match get("SECURE_COOKIES") {
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(ConfigError { key: "SECURE_COOKIES", value }),
            },
            None => defaults.secure_cookies,
        };

        let page_size = positive(get("PAGE_SIZE"), "PAGE_SIZE", defaults.page_size)?;
        let heatmap_days = positive(get("HEATMAP_DAYS"), "HEATMAP_DAYS", defaults.heatmap_days)?;

        Ok(Self {
            database_url,
            bind_addr,
            secure_cookies,
            page_size,
            heatmap_days,
        })
    }
}

fn positive(raw: Option<String>, key: &'static str, default: u32) -> Result<u32, ConfigError> {
    let Some(value) = raw else {
        return Ok(default);
    };
    match value.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError { key, value }),
    }
}
