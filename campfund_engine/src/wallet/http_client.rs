use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use serde::Serialize;

use crate::{
    traits::{
        BadgeAward,
        DonationConfirmation,
        DonorStatsUpdate,
        WalletCredit,
        WalletService,
        WalletServiceError,
    },
    wallet::WalletServiceConfig,
};

pub const CREDIT_WALLET_PATH: &str = "/wallets/credit";
pub const DONOR_STATS_PATH: &str = "/donors/stats";
pub const DONATION_CONFIRMATION_PATH: &str = "/notifications/donation-confirmation";
pub const AWARD_BADGE_PATH: &str = "/badges/award";

/// [`WalletService`] over JSON/HTTP.
///
/// Every request is a `POST` with the request object as the body and its idempotency key repeated in the
/// `Idempotency-Key` header.
#[derive(Clone)]
pub struct HttpWalletService {
    base_url: String,
    client: Arc<Client>,
}

impl HttpWalletService {
    pub fn new(config: WalletServiceConfig) -> Result<Self, WalletServiceError> {
        let mut headers = HeaderMap::with_capacity(2);
        if !config.api_key.is_empty() {
            let val = HeaderValue::from_str(config.api_key.reveal().as_str())
                .map_err(|e| WalletServiceError::Configuration(e.to_string()))?;
            headers.insert("X-Api-Key", val);
        }
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| WalletServiceError::Configuration(e.to_string()))?;
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self { base_url, client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post<B: Serialize>(&self, path: &str, idempotency_key: &str, body: &B) -> Result<(), WalletServiceError> {
        let url = self.url(path);
        trace!("💸️ POST {url} ({idempotency_key})");
        let response =
            self.client.post(url).header("Idempotency-Key", idempotency_key).json(body).send().await.map_err(|e| {
                if e.is_timeout() {
                    WalletServiceError::Timeout
                } else {
                    WalletServiceError::Unreachable(e.to_string())
                }
            })?;
        if response.status().is_success() {
            trace!("💸️ {path} succeeded. {}", response.status());
            Ok(())
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(WalletServiceError::Rejected { status, message })
        }
    }
}

impl WalletService for HttpWalletService {
    async fn credit_wallet(&self, credit: WalletCredit) -> Result<(), WalletServiceError> {
        self.post(CREDIT_WALLET_PATH, &credit.idempotency_key, &credit).await?;
        debug!("💸️ Credited {} to the wallet of {}", credit.amount, credit.owner_id);
        Ok(())
    }

    async fn update_donor_stats(&self, update: DonorStatsUpdate) -> Result<(), WalletServiceError> {
        self.post(DONOR_STATS_PATH, &update.idempotency_key, &update).await
    }

    async fn send_donation_confirmation(&self, confirmation: DonationConfirmation) -> Result<(), WalletServiceError> {
        self.post(DONATION_CONFIRMATION_PATH, &confirmation.idempotency_key, &confirmation).await
    }

    async fn award_badge(&self, award: BadgeAward) -> Result<(), WalletServiceError> {
        self.post(AWARD_BADGE_PATH, &award.idempotency_key, &award).await
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use campfund_common::Secret;

    use super::*;

    #[test]
    fn urls_ignore_trailing_slashes() {
        let config = WalletServiceConfig {
            base_url: "http://wallets.internal:8460/".into(),
            api_key: Secret::new("key".into()),
            timeout: Duration::from_secs(1),
        };
        let client = HttpWalletService::new(config).unwrap();
        assert_eq!(client.url(CREDIT_WALLET_PATH), "http://wallets.internal:8460/wallets/credit");
    }

    #[test]
    fn api_keys_must_be_valid_header_values() {
        let config = WalletServiceConfig { api_key: Secret::new("bad\nkey".into()), ..Default::default() };
        assert!(matches!(HttpWalletService::new(config), Err(WalletServiceError::Configuration(_))));
    }

    #[tokio::test]
    async fn unreachable_services_are_reported() {
        let _ = env_logger::try_init();
        // Port 9 (discard) is never served on a test machine
        let config = WalletServiceConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let client = HttpWalletService::new(config).unwrap();
        let award = BadgeAward { idempotency_key: "outbox-1-badge".into(), donor_id: "donor-1".into() };
        let err = client.award_badge(award).await.unwrap_err();
        assert!(matches!(err, WalletServiceError::Unreachable(_) | WalletServiceError::Timeout));
    }
}
