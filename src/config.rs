use std::collections::HashMap;

use derive_more::Display;

use crate::chart::GapPolicy;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_DOMAIN: &str = "localhost";
const DEFAULT_POOL_SIZE: u32 = 10;
const MIN_COOKIE_KEY_LEN: usize = 32;

#[derive(Debug, Display, PartialEq)]
pub enum ConfigError {
    #[display("{_0} must be set")]
    Missing(&'static str),

    #[display("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl std::error::Error for ConfigError {}

/// Runtime settings, read from the environment (and an optional `.env` file).
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub cookie_secret_key: String,
    /// The identity that is always admin, whatever the grants table says.
    pub bootstrap_admin: Option<String>,
    pub bootstrap_admin_password: Option<String>,
    pub bootstrap_password_override: bool,
    pub bind_address: String,
    pub domain: String,
    pub pool_size: u32,
    pub password_hash_cost: u32,
    pub gap_policy: GapPolicy,
}

impl Settings {
    pub fn from_env() -> Result<Settings, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Result<Settings, ConfigError> {
        Self::from_lookup(|name| vars.get(name).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Settings, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let var = |name: &str| lookup(name).filter(|x| !x.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));

        let cookie_secret_key = required("COOKIE_SECRET_KEY")?;
        if cookie_secret_key.len() < MIN_COOKIE_KEY_LEN {
            return Err(ConfigError::Invalid {
                name: "COOKIE_SECRET_KEY",
                reason: format!("at least {} bytes are required", MIN_COOKIE_KEY_LEN),
            });
        }

        let pool_size = match var("DB_POOL_SIZE") {
            None => DEFAULT_POOL_SIZE,
            Some(x) => x.trim().parse::<u32>()
                .ok()
                .filter(|x| *x > 0)
                .ok_or_else(|| ConfigError::Invalid { name: "DB_POOL_SIZE", reason: format!("'{}' is not a positive integer", x) })?,
        };

        let password_hash_cost = match var("PASSWORD_HASH_COST") {
            None => bcrypt::DEFAULT_COST,
            Some(x) => x.trim().parse::<u32>()
                .ok()
                .filter(|x| (4..=31).contains(x))
                .ok_or_else(|| ConfigError::Invalid { name: "PASSWORD_HASH_COST", reason: format!("'{}' is not between 4 and 31", x) })?,
        };

        let gap_policy = match var("ZERO_GAP_METRICS") {
            None => GapPolicy::default(),
            Some(x) => GapPolicy::parse(&x)
                .map_err(|reason| ConfigError::Invalid { name: "ZERO_GAP_METRICS", reason })?,
        };

        Ok(Settings {
            database_url: required("DATABASE_URL")?,
            cookie_secret_key,
            bootstrap_admin: var("BOOTSTRAP_ADMIN_EMAIL").map(|x| x.trim().to_lowercase()),
            bootstrap_admin_password: var("BOOTSTRAP_ADMIN_PASSWORD"),
            bootstrap_password_override: var("BOOTSTRAP_ADMIN_PASSWORD_OVERRIDE").is_some(),
            bind_address: var("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            domain: var("DOMAIN").unwrap_or_else(|| DEFAULT_DOMAIN.to_string()),
            pool_size,
            password_hash_cost,
            gap_policy,
        })
    }
}
