use broker::BrokerConfig;
use std::time::Duration;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Worker process configuration
///
/// Expected environment variables:
/// - DATABASE_URL (required)
/// - MAX_CONNECTIONS (optional, default: 10)
/// - WEBHOOK_TIMEOUT_SECS (optional, default: 10)
/// - LOKI_URL (optional, ships logs to Loki when set)
/// - everything [`BrokerConfig`] reads
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub webhook_timeout: Duration,
    pub loki_url: Option<String>,
    pub broker: BrokerConfig,
}

impl WorkerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable not set"))?;

        let max_connections = match lookup("MAX_CONNECTIONS") {
            Some(value) => value
                .trim()
                .parse::<u32>()
                .map_err(|_| anyhow::anyhow!("MAX_CONNECTIONS must be a number"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let webhook_timeout = match lookup("WEBHOOK_TIMEOUT_SECS") {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| anyhow::anyhow!("WEBHOOK_TIMEOUT_SECS must be a number"))?,
            None => DEFAULT_WEBHOOK_TIMEOUT,
        };

        let config = Self {
            database_url,
            max_connections,
            webhook_timeout,
            loki_url: lookup("LOKI_URL").filter(|url| !url.trim().is_empty()),
            broker: BrokerConfig::from_lookup(&lookup)?,
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_connections == 0 {
            anyhow::bail!("MAX_CONNECTIONS must be greater than 0");
        }

        if self.webhook_timeout.is_zero() {
            anyhow::bail!("WEBHOOK_TIMEOUT_SECS must be greater than 0");
        }

        Ok(())
    }
}
