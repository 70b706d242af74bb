use std::{env, fmt::Display, str::FromStr, time::Duration};

use campfund_common::helpers::parse_boolean_flag;
use campfund_engine::{
    cfe_api::idempotency::DEFAULT_FINGERPRINT_TTL,
    BatchConfig,
    RelayConfig,
    RetryPolicy,
    SchedulerConfig,
    WalletServiceConfig,
};
use log::*;

const DEFAULT_CFS_HOST: &str = "127.0.0.1";
const DEFAULT_CFS_PORT: u16 = 8360;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_HOLDING_ACCOUNT_ID: &str = "campfund-general-fund";
const DEFAULT_OUTBOX_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_ACTIVATION_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_COMPLETION_INTERVAL: Duration = Duration::from_secs(300);
const DEFAULT_EXPIRATION_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    /// Apply pending database migrations on startup.
    pub run_migrations: bool,
    /// How long a webhook fingerprint is remembered.
    pub idempotency_ttl: Duration,
    /// When set (and the `redis` feature is enabled), webhook fingerprints are shared through Redis.
    pub redis_url: Option<String>,
    /// Wallet owner that receives transfers that cannot be tied to a donation.
    pub holding_account_id: String,
    pub wallet: WalletServiceConfig,
    pub outbox: OutboxWorkerConfig,
    pub scheduler: SchedulerWorkerConfig,
}

#[derive(Clone, Debug)]
pub struct OutboxWorkerConfig {
    pub poll_interval: Duration,
    pub relay: RelayConfig,
}

#[derive(Clone, Debug)]
pub struct SchedulerWorkerConfig {
    pub activation_interval: Duration,
    pub completion_interval: Duration,
    pub expiration_interval: Duration,
    pub scheduler: SchedulerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_CFS_HOST.to_string(),
            port: DEFAULT_CFS_PORT,
            database_url: String::default(),
            max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            run_migrations: true,
            idempotency_ttl: DEFAULT_FINGERPRINT_TTL,
            redis_url: None,
            holding_account_id: DEFAULT_HOLDING_ACCOUNT_ID.to_string(),
            wallet: WalletServiceConfig::default(),
            outbox: OutboxWorkerConfig::default(),
            scheduler: SchedulerWorkerConfig::default(),
        }
    }
}

impl Default for OutboxWorkerConfig {
    fn default() -> Self {
        Self { poll_interval: DEFAULT_OUTBOX_POLL_INTERVAL, relay: RelayConfig::default() }
    }
}

impl Default for SchedulerWorkerConfig {
    fn default() -> Self {
        Self {
            activation_interval: DEFAULT_ACTIVATION_INTERVAL,
            completion_interval: DEFAULT_COMPLETION_INTERVAL,
            expiration_interval: DEFAULT_EXPIRATION_INTERVAL,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("CFS_HOST").ok().unwrap_or_else(|| DEFAULT_CFS_HOST.into());
        let port = env_or_default("CFS_PORT", DEFAULT_CFS_PORT);
        let database_url = env::var("CFS_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ CFS_DATABASE_URL is not set. Please set it to the URL for the Campfund ledger database.");
            String::default()
        });
        let max_connections = env_or_default("CFS_DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS);
        let run_migrations = parse_boolean_flag(env::var("CFS_RUN_MIGRATIONS").ok(), true);
        let idempotency_ttl = hours_or_default("CFS_IDEMPOTENCY_TTL_HOURS", DEFAULT_FINGERPRINT_TTL);
        let redis_url = env::var("CFS_REDIS_URL").ok().filter(|s| !s.trim().is_empty());
        let holding_account_id = env::var("CFS_HOLDING_ACCOUNT_ID").ok().unwrap_or_else(|| {
            warn!(
                "🪛️ CFS_HOLDING_ACCOUNT_ID is not set. Uncorrelated transfers will be credited to \
                 {DEFAULT_HOLDING_ACCOUNT_ID}."
            );
            DEFAULT_HOLDING_ACCOUNT_ID.to_string()
        });
        let wallet = WalletServiceConfig::new_from_env_or_default();
        let outbox = OutboxWorkerConfig::from_env_or_default();
        let scheduler = SchedulerWorkerConfig::from_env_or_default();
        Self {
            host,
            port,
            database_url,
            max_connections,
            run_migrations,
            idempotency_ttl,
            redis_url,
            holding_account_id,
            wallet,
            outbox,
            scheduler,
        }
    }
}

impl OutboxWorkerConfig {
    pub fn from_env_or_default() -> Self {
        let defaults = RelayConfig::default();
        let poll_interval = interval_or_default("CFS_OUTBOX_POLL_INTERVAL_SECS", DEFAULT_OUTBOX_POLL_INTERVAL);
        let batch_size = env_or_default("CFS_OUTBOX_BATCH_SIZE", defaults.batch_size);
        let lease_timeout = seconds_or_default("CFS_OUTBOX_LEASE_TIMEOUT_SECS", defaults.lease_timeout);
        let policy = defaults.retry_policy;
        let retry_policy = RetryPolicy {
            max_attempts: env_or_default("CFS_OUTBOX_MAX_ATTEMPTS", policy.max_attempts),
            base_backoff: seconds_or_default("CFS_OUTBOX_BASE_BACKOFF_SECS", policy.base_backoff),
            max_backoff: seconds_or_default("CFS_OUTBOX_MAX_BACKOFF_SECS", policy.max_backoff),
        };
        Self { poll_interval, relay: RelayConfig { batch_size, lease_timeout, retry_policy } }
    }
}

impl SchedulerWorkerConfig {
    pub fn from_env_or_default() -> Self {
        let defaults = SchedulerConfig::default();
        let activation_interval = interval_or_default("CFS_ACTIVATION_INTERVAL_SECS", DEFAULT_ACTIVATION_INTERVAL);
        let completion_interval = interval_or_default("CFS_COMPLETION_INTERVAL_SECS", DEFAULT_COMPLETION_INTERVAL);
        let expiration_interval = interval_or_default("CFS_EXPIRATION_INTERVAL_SECS", DEFAULT_EXPIRATION_INTERVAL);
        let batch = BatchConfig {
            fetch_limit: env_or_default("CFS_SCHEDULER_FETCH_LIMIT", defaults.batch.fetch_limit),
            batch_size: env_or_default("CFS_SCHEDULER_BATCH_SIZE", defaults.batch.batch_size).max(1),
            max_jitter: millis_or_default("CFS_SCHEDULER_MAX_JITTER_MS", defaults.batch.max_jitter),
            inter_batch_delay: millis_or_default("CFS_SCHEDULER_BATCH_DELAY_MS", defaults.batch.inter_batch_delay),
        };
        let mut pooling_threshold_percent =
            env_or_default("CFS_POOLING_THRESHOLD_PERCENT", defaults.pooling_threshold_percent);
        if pooling_threshold_percent > 100 {
            warn!("🪛️ CFS_POOLING_THRESHOLD_PERCENT cannot exceed 100. Using 100 instead.");
            pooling_threshold_percent = 100;
        }
        Self {
            activation_interval,
            completion_interval,
            expiration_interval,
            scheduler: SchedulerConfig { batch, pooling_threshold_percent },
        }
    }
}

/// Reads and parses `key`, logging and falling back to `default` if it is missing or invalid.
fn env_or_default<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {key}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {key} is not set. Using the default value of {default}.");
            default
        },
    }
}

fn seconds_or_default(key: &str, default: Duration) -> Duration {
    Duration::from_secs(env_or_default(key, default.as_secs()))
}

fn millis_or_default(key: &str, default: Duration) -> Duration {
    Duration::from_millis(env_or_default(key, default.as_millis() as u64))
}

/// Worker periods must be non-zero, since a timer cannot tick every 0s.
fn interval_or_default(key: &str, default: Duration) -> Duration {
    let interval = seconds_or_default(key, default);
    if interval.is_zero() {
        error!("🪛️ {key} must be at least one second. Using the default, {}s, instead.", default.as_secs());
        return default;
    }
    interval
}

fn hours_or_default(key: &str, default: Duration) -> Duration {
    let hours = env_or_default(key, default.as_secs() / 3600);
    match hours.checked_mul(3600).filter(|secs| *secs > 0) {
        Some(secs) => Duration::from_secs(secs),
        None => {
            error!("🪛️ {hours} hours is not a usable value for {key}. Using the default instead.");
            default
        },
    }
}
