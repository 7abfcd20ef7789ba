use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Where instance records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryBackend {
    Postgres,
    Memory,
}

impl FromStr for RegistryBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub registry_backend: RegistryBackend,
    pub database_url: Option<String>,
    pub listen_addr: SocketAddr,
    pub intent_api_key: String,
    pub admin_ids: String,
    pub default_os_image: String,
    pub hostname_prefix: String,
    pub notify_webhook_url: Option<String>,
    pub reconcile_interval_secs: u64,
    pub enforce_owner_on_power: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let registry_backend = parsed("REGISTRY_BACKEND", "postgres")?;
        let database_url = optional("DATABASE_URL");
        if registry_backend == RegistryBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        Ok(Self {
            registry_backend,
            database_url,
            listen_addr: parsed("LISTEN_ADDR", "0.0.0.0:8080")?,
            intent_api_key: optional("INTENT_API_KEY")
                .ok_or(ConfigError::Missing("INTENT_API_KEY"))?,
            admin_ids: env::var("ADMIN_IDS").unwrap_or_default(),
            default_os_image: env::var("DEFAULT_OS_IMAGE")
                .unwrap_or_else(|_| "ubuntu:22.04".into()),
            hostname_prefix: env::var("HOSTNAME_PREFIX").unwrap_or_else(|_| "powerhost".into()),
            notify_webhook_url: optional("NOTIFY_WEBHOOK_URL"),
            reconcile_interval_secs: parsed("RECONCILE_INTERVAL_SECS", "60")?,
            enforce_owner_on_power: parsed("ENFORCE_OWNER_ON_POWER", "false")?,
        })
    }
}

/// Non-empty value of `name`, if set.
fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = env::var(name).unwrap_or_else(|_| default.into());
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}
