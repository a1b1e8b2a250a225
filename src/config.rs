//! Runtime configuration, read from the environment (and `.env` when present).

use crate::domain::enrollment::BypassPolicy;
use crate::error::{Result, SettlementError};
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
pub const DEFAULT_CURRENCY: &str = "inr";
pub const DEFAULT_PAYMENT_TIMEOUT: Duration = Duration::from_millis(15_000);
pub const DEFAULT_JWT_SECRET: &str = "dev_jwt_secret_change_me";
pub const DEFAULT_PORT: u16 = 4000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Processor secret key. `None` puts the gateway in mock mode.
    pub stripe_secret_key: Option<String>,
    pub stripe_publishable_key: Option<String>,
    pub stripe_api_base: String,
    /// Lowercase ISO currency every intent is created in.
    pub currency: String,
    /// Upper bound on any single processor call.
    pub payment_timeout: Duration,
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
    pub bypass_policy: BypassPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stripe_secret_key: None,
            stripe_publishable_key: None,
            stripe_api_base: DEFAULT_STRIPE_API_BASE.to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
            payment_timeout: DEFAULT_PAYMENT_TIMEOUT,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            bypass_policy: BypassPolicy::default(),
        }
    }
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let payment_timeout = match get("PAYMENT_TIMEOUT_MS") {
            Some(raw) => {
                let millis: u64 = raw.parse().map_err(|_| {
                    SettlementError::ValidationError(format!(
                        "PAYMENT_TIMEOUT_MS must be a positive integer, got '{raw}'"
                    ))
                })?;
                if millis == 0 {
                    return Err(SettlementError::ValidationError(
                        "PAYMENT_TIMEOUT_MS must be greater than zero".to_string(),
                    ));
                }
                Duration::from_millis(millis)
            }
            None => defaults.payment_timeout,
        };

        let bind_addr = match (get("BIND_ADDR"), get("PORT")) {
            (Some(raw), _) => raw.parse().map_err(|_| {
                SettlementError::ValidationError(format!("BIND_ADDR is not a socket address: '{raw}'"))
            })?,
            (None, Some(port)) => {
                let port: u16 = port.parse().map_err(|_| {
                    SettlementError::ValidationError(format!("PORT is not a port number: '{port}'"))
                })?;
                SocketAddr::from(([0, 0, 0, 0], port))
            }
            (None, None) => defaults.bind_addr,
        };

        let bypass_policy = match get("ENROLLMENT_BYPASS") {
            Some(raw) => raw.parse().map_err(SettlementError::ValidationError)?,
            None => defaults.bypass_policy,
        };

        Ok(Self {
            stripe_secret_key: get("STRIPE_SECRET_KEY"),
            stripe_publishable_key: get("STRIPE_PUBLISHABLE_KEY"),
            stripe_api_base: get("STRIPE_API_BASE").unwrap_or(defaults.stripe_api_base),
            currency: get("PAYMENT_CURRENCY")
                .map(|currency| currency.to_lowercase())
                .unwrap_or(defaults.currency),
            payment_timeout,
            jwt_secret: get("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            bind_addr,
            bypass_policy,
        })
    }

    pub fn processor_configured(&self) -> bool {
        self.stripe_secret_key.is_some()
    }
}
