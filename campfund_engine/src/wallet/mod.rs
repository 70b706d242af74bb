//! HTTP client for the downstream wallet and notification service.
mod config;
mod http_client;

pub use config::WalletServiceConfig;
pub use http_client::HttpWalletService;
