use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use anyhow::{Context, Result};
use sos_core::{channel::TwilioConfig, phone::DEFAULT_COUNTRY_CODE};
use tracing::{info, warn};

pub const DEFAULT_SESSION_BUFFER: usize = 32;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub redis_url: Option<String>,
    pub country_code: String,
    pub cors_origin: Option<String>,
    pub session_buffer: usize,
    pub twilio: Option<TwilioConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            redis_url: None,
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            cors_origin: None,
            session_buffer: DEFAULT_SESSION_BUFFER,
            twilio: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let twilio = match (
            var("TWILIO_SID"),
            read_secret("TWILIO_AUTH"),
            var("TWILIO_NUMBER"),
        ) {
            (Ok(account_sid), Some(auth_token), Ok(from_number)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                from_number,
            }),
            _ => {
                warn!("Twilio env variables are missing. SMS will not work properly.");
                None
            }
        };

        Ok(Self {
            port: try_load("RUST_PORT", "5000")?,
            redis_url: var("REDIS_URL").ok(),
            country_code: try_load("SOS_COUNTRY_CODE", DEFAULT_COUNTRY_CODE)?,
            cors_origin: var("CORS_ORIGIN").ok(),
            session_buffer: try_load("SOS_SESSION_BUFFER", "32")?,
            twilio,
        })
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let value = var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("Invalid {key} value: {value}"))
}

/// Docker secret first, then the plain environment variable.
fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            info!("Failed to read {secret_name} from file: {e}");
        })
        .or_else(|_| var(secret_name))
        .ok()
}
