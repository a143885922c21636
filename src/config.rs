use std::env;
use std::time::Duration;

use crate::error::AppError;

const SANDBOX_GATEWAY_URL: &str = "https://sandbox.sslcommerz.com";
const LIVE_GATEWAY_URL: &str = "https://securepay.sslcommerz.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub public_base_url: String,
    pub admin_email: String,
    pub payment_currency: String,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub store_id: String,
    pub store_password: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok(other) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {other}, expected compact/json"
                )));
            }
        };

        let sandbox: bool = parse_or_default("SSLCOMMERZ_IS_SANDBOX", true)?;
        let base_url = env::var("GATEWAY_BASE_URL").unwrap_or_else(|_| {
            if sandbox {
                SANDBOX_GATEWAY_URL.to_string()
            } else {
                LIVE_GATEWAY_URL.to_string()
            }
        });

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            admin_email: env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@localhost".to_string()),
            payment_currency: env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "BDT".to_string()),
            gateway: GatewayConfig {
                store_id: env::var("SSLCOMMERZ_STORE_ID").unwrap_or_default(),
                store_password: env::var("SSLCOMMERZ_STORE_PASSWORD").unwrap_or_default(),
                base_url: base_url.trim_end_matches('/').to_string(),
                timeout: Duration::from_secs(parse_or_default("GATEWAY_TIMEOUT_SECS", 15)?),
            },
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
