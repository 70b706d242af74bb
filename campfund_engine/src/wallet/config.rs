use std::time::Duration;

use campfund_common::Secret;
use log::*;

const DEFAULT_WALLET_SERVICE_URL: &str = "http://localhost:8460";
const DEFAULT_WALLET_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct WalletServiceConfig {
    pub base_url: String,
    pub api_key: Secret<String>,
    /// Upper bound on every request, connection included. The relay treats a timeout as a retryable failure.
    pub timeout: Duration,
}

impl Default for WalletServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_WALLET_SERVICE_URL.to_string(),
            api_key: Secret::default(),
            timeout: DEFAULT_WALLET_TIMEOUT,
        }
    }
}

impl WalletServiceConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("CFS_WALLET_SERVICE_URL").unwrap_or_else(|_| {
            warn!("CFS_WALLET_SERVICE_URL not set, using {DEFAULT_WALLET_SERVICE_URL} as default");
            DEFAULT_WALLET_SERVICE_URL.to_string()
        });
        let api_key = Secret::new(std::env::var("CFS_WALLET_API_KEY").unwrap_or_else(|_| {
            warn!("CFS_WALLET_API_KEY not set. Requests to the wallet service will not be authenticated.");
            String::default()
        }));
        let timeout = std::env::var("CFS_WALLET_TIMEOUT_SECS")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| warn!("Invalid value for CFS_WALLET_TIMEOUT_SECS: {s}. {e}. Using the default."))
                    .ok()
            })
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_WALLET_TIMEOUT);
        Self { base_url: base_url.trim_end_matches('/').to_string(), api_key, timeout }
    }
}
